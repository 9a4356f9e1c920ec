use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use chrono::NaiveDateTime;

use crate::error::TurnError;
use crate::model::{PriorityPolarity, TimestampFormat, TurnConfig};
use crate::report::{turn_table_frame, TurnReport};
use crate::schema;
use crate::tables::InputTables;
use crate::turn::compute_turn_from_tables;

#[pyclass(name = "TurnScheduler")]
pub struct TurnScheduler {
    config: TurnConfig,
}

fn parse_polarity(raw: &str) -> Result<PriorityPolarity, TurnError> {
    match raw {
        "one_is_head" => Ok(PriorityPolarity::OneIsHead),
        "one_is_tail" => Ok(PriorityPolarity::OneIsTail),
        other => Err(TurnError::InvalidData(format!(
            "polarity must be 'one_is_head' or 'one_is_tail', got '{other}'"
        ))),
    }
}

fn parse_format(raw: &str) -> Result<TimestampFormat, TurnError> {
    match raw {
        "iso" => Ok(TimestampFormat::Iso),
        "legacy" => Ok(TimestampFormat::Legacy),
        other => Err(TurnError::InvalidData(format!(
            "timestamp format must be 'iso' or 'legacy', got '{other}'"
        ))),
    }
}

#[pymethods]
impl TurnScheduler {
    /// Head flow in l/s, turn duration in hours.
    #[new]
    #[pyo3(signature = (
        head_flow,
        turn_duration,
        start,
        simulate=false,
        programmed_volume_per_ha=0.0,
        compensation_factor=1.0,
        polarity=None,
        timestamp_format="iso",
        show_volume=true
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        head_flow: f64,
        turn_duration: f64,
        start: NaiveDateTime,
        simulate: bool,
        programmed_volume_per_ha: f64,
        compensation_factor: f64,
        polarity: Option<&str>,
        timestamp_format: &str,
        show_volume: bool,
    ) -> PyResult<Self> {
        let mut config = TurnConfig::new(head_flow, turn_duration, start)
            .with_programmed_volume_per_ha(programmed_volume_per_ha)
            .with_compensation_factor(compensation_factor)
            .with_timestamp_format(parse_format(timestamp_format)?)
            .with_show_volume(show_volume);
        if simulate {
            config = config.with_simulation(programmed_volume_per_ha);
        }
        if let Some(polarity) = polarity {
            config = config.with_priority_polarity(parse_polarity(polarity)?);
        }
        config.validate()?;
        Ok(Self { config })
    }

    /// Schedule a turn and return the report as a JSON string.
    #[pyo3(signature = (padron, solicitud, modos, refuerzos=None, reservorio=None))]
    fn compute(
        &self,
        padron: PyDataFrame,
        solicitud: PyDataFrame,
        modos: PyDataFrame,
        refuerzos: Option<PyDataFrame>,
        reservorio: Option<PyDataFrame>,
    ) -> PyResult<String> {
        let tables = tables(padron, solicitud, modos, refuerzos, reservorio);
        let outcome = compute_turn_from_tables(&tables, &self.config)?;
        Ok(TurnReport::build(&outcome, &self.config)?.to_json()?)
    }

    /// Schedule a turn and return one row per parcel with datetime columns.
    #[pyo3(signature = (padron, solicitud, modos, refuerzos=None, reservorio=None))]
    fn turn_table(
        &self,
        padron: PyDataFrame,
        solicitud: PyDataFrame,
        modos: PyDataFrame,
        refuerzos: Option<PyDataFrame>,
        reservorio: Option<PyDataFrame>,
    ) -> PyResult<PyDataFrame> {
        let tables = tables(padron, solicitud, modos, refuerzos, reservorio);
        let outcome = compute_turn_from_tables(&tables, &self.config)?;
        Ok(PyDataFrame(turn_table_frame(&outcome)?))
    }
}

fn tables(
    padron: PyDataFrame,
    solicitud: PyDataFrame,
    modos: PyDataFrame,
    refuerzos: Option<PyDataFrame>,
    reservorio: Option<PyDataFrame>,
) -> InputTables {
    InputTables {
        padron: padron.0,
        solicitud: solicitud.0,
        modos: modos.0,
        refuerzos: refuerzos.map(|df| df.0),
        reservorio: reservorio.map(|df| df.0),
    }
}

/// JSON request in, JSON report out.
#[pyfunction]
fn compute_turn_json(request: &str) -> PyResult<String> {
    Ok(crate::turn::compute_turn_json(request)?)
}

/// Export column names as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let padron = PyModule::new(m.py(), "padron")?;
    padron.add("PARCEL_ID", schema::padron::PARCEL_ID)?;
    padron.add("CANAL", schema::padron::CANAL)?;
    padron.add("SUBGROUP", schema::padron::SUBGROUP)?;
    padron.add("GROUP", schema::padron::GROUP)?;
    padron.add("REGISTERED_AREA", schema::padron::REGISTERED_AREA)?;
    padron.add("HA_SI", schema::padron::HA_SI)?;
    padron.add("TPO_REC_TOMA", schema::padron::TPO_REC_TOMA)?;
    padron.add("TPO_REC_CABEZA_COLA", schema::padron::TPO_REC_CABEZA_COLA)?;
    padron.add("TPO_REC_COLA_CABEZA", schema::padron::TPO_REC_COLA_CABEZA)?;
    padron.add("TPO_DESCUELGUE", schema::padron::TPO_DESCUELGUE)?;
    padron.add("CC", schema::padron::CC)?;
    padron.add("PP", schema::padron::PP)?;
    padron.add("NETWORK_ID", schema::padron::NETWORK_ID)?;
    m.add_submodule(&padron)?;

    let solicitud = PyModule::new(m.py(), "solicitud")?;
    solicitud.add("PARCEL_ID", schema::solicitud::PARCEL_ID)?;
    solicitud.add("SUP_AD", schema::solicitud::SUP_AD)?;
    solicitud.add("SUP_RES", schema::solicitud::SUP_RES)?;
    solicitud.add("SUP_REC", schema::solicitud::SUP_REC)?;
    solicitud.add("SUP_CED", schema::solicitud::SUP_CED)?;
    solicitud.add("HA_ACTIVA", schema::solicitud::HA_ACTIVA)?;
    m.add_submodule(&solicitud)?;

    let refuerzo = PyModule::new(m.py(), "refuerzo")?;
    refuerzo.add("FLOW", schema::refuerzo::FLOW)?;
    refuerzo.add("DURATION", schema::refuerzo::DURATION)?;
    refuerzo.add("NETWORK_ID", schema::refuerzo::NETWORK_ID)?;
    m.add_submodule(&refuerzo)?;

    let reservorio = PyModule::new(m.py(), "reservorio")?;
    reservorio.add("VOLUME", schema::reservorio::VOLUME)?;
    reservorio.add("NETWORK_ID", schema::reservorio::NETWORK_ID)?;
    m.add_submodule(&reservorio)?;

    let modos = PyModule::new(m.py(), "modos")?;
    modos.add("CANAL", schema::modos::CANAL)?;
    modos.add("PRIORITY", schema::modos::PRIORITY)?;
    modos.add("SUBGROUP_MODE", schema::modos::SUBGROUP_MODE)?;
    modos.add("GROUP_MODE", schema::modos::GROUP_MODE)?;
    m.add_submodule(&modos)?;

    let turn_frame = PyModule::new(m.py(), "turn_frame")?;
    turn_frame.add("CANAL", schema::turn_frame::CANAL)?;
    turn_frame.add("PARCEL_ID", schema::turn_frame::PARCEL_ID)?;
    turn_frame.add("CC", schema::turn_frame::CC)?;
    turn_frame.add("PP", schema::turn_frame::PP)?;
    turn_frame.add("FLOW", schema::turn_frame::FLOW)?;
    turn_frame.add("VOLUME", schema::turn_frame::VOLUME)?;
    turn_frame.add("DURATION_H", schema::turn_frame::DURATION_H)?;
    turn_frame.add("START", schema::turn_frame::START)?;
    turn_frame.add("END", schema::turn_frame::END)?;
    m.add_submodule(&turn_frame)?;

    Ok(())
}

#[pymodule]
fn turno_riego(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<TurnScheduler>()?;
    m.add_function(wrap_pyfunction!(compute_turn_json, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
