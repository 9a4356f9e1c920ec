//! The turn pipeline: snapshot in, schedule out.
//!
//! Every call is independent; nothing is cached between requests.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::aggregation::Hierarchy;
use crate::error::{Result, TurnError};
use crate::materialize::{materialize_canal, Allotment, CanalSchedule};
use crate::model::{parse_start, CanalId, PriorityPolarity, Snapshot, TimestampFormat, TurnConfig};
use crate::modes::resolve_windows;
use crate::ordering::order_parcels;
use crate::report::TurnReport;
use crate::tables::{read_json_table, snapshot_from_tables, InputTables};
use crate::transit::resolve_network_times;
use crate::volume::VolumeModel;

/// Everything computed for one turn, unrounded.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub hierarchy: Hierarchy,
    /// tpo_red per canal, minutes.
    pub network_times: BTreeMap<CanalId, f64>,
    pub volume: VolumeModel,
    /// Ascending canal id.
    pub canals: Vec<CanalSchedule>,
}

impl TurnOutcome {
    /// Canals scheduled without a mode row.
    pub fn fallbacks(&self) -> Vec<CanalId> {
        self.canals
            .iter()
            .filter(|s| s.window.fallback)
            .map(|s| s.window.canal)
            .collect()
    }

    pub fn canal(&self, canal: CanalId) -> Option<&CanalSchedule> {
        self.canals.iter().find(|s| s.window.canal == canal)
    }
}

pub fn compute_turn(snapshot: &Snapshot, config: &TurnConfig) -> Result<TurnOutcome> {
    config.validate()?;
    let span = tracing::info_span!("turn", parcels = snapshot.parcels.len());
    let _enter = span.enter();

    let hierarchy = Hierarchy::aggregate(&snapshot.parcels)?;
    hierarchy.ensure_positive_areas()?;

    let network_times = resolve_network_times(&hierarchy, &snapshot.modes);
    let volume = VolumeModel::build(
        &hierarchy,
        &network_times,
        &snapshot.reinforcements,
        &snapshot.reservoirs,
        config,
    )?;
    let windows = resolve_windows(&hierarchy, &snapshot.modes, config.turn_duration, config.start)?;

    let mut canals = Vec::with_capacity(windows.len());
    for window in &windows {
        let aggregate = hierarchy.canals.get(&window.canal).ok_or_else(|| {
            TurnError::KeyMismatch(format!("window for unknown canal {}", window.canal))
        })?;
        let members = aggregate
            .members
            .iter()
            .map(|&i| {
                snapshot.parcels.get(i).ok_or_else(|| {
                    TurnError::InconsistentHierarchy(format!(
                        "canal {} references missing parcel row {i}",
                        window.canal
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let ordered = order_parcels(members, window.mode.priority);

        let area = aggregate.area.irrigation;
        let allotment = Allotment {
            area,
            volume_per_ha: volume.volume_per_ha,
            flow: volume.canal_flow(area, window.duration, config),
            programmed_volume_per_ha: config.programmed_volume_per_ha,
        };
        canals.push(materialize_canal(window, &ordered, &allotment)?);
    }

    let outcome = TurnOutcome {
        hierarchy,
        network_times,
        volume,
        canals,
    };
    tracing::info!(
        canals = outcome.canals.len(),
        fallbacks = outcome.fallbacks().len(),
        volume_per_ha = outcome.volume.volume_per_ha,
        "turn scheduled"
    );
    Ok(outcome)
}

pub fn compute_turn_from_tables(tables: &InputTables, config: &TurnConfig) -> Result<TurnOutcome> {
    let snapshot = snapshot_from_tables(tables, config.priority_polarity)?;
    compute_turn(&snapshot, config)
}

// ── JSON request ────────────────────────────────────────────────────────────

fn default_compensation() -> f64 {
    1.0
}

fn default_show_volume() -> u8 {
    1
}

/// A scheduling request as posted by the irrigation web client.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub padron: Value,
    #[serde(default)]
    pub solicitud: Value,
    #[serde(default)]
    pub modos: Value,
    #[serde(default)]
    pub refuerzos: Value,
    #[serde(default)]
    pub reservorio: Value,
    /// Head flow, l/s.
    pub caudal: f64,
    /// Turn duration, hours.
    pub turno: f64,
    pub fecha: String,
    #[serde(default)]
    pub simular: u8,
    #[serde(default)]
    pub vol_riego_p_ha: f64,
    #[serde(default = "default_compensation")]
    pub f_compensa: f64,
    #[serde(default = "default_show_volume")]
    pub volumen_tiempo: u8,
    #[serde(default)]
    pub formato_fecha: TimestampFormat,
    #[serde(default)]
    pub polaridad: Option<PriorityPolarity>,
}

impl TurnRequest {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn config(&self) -> Result<TurnConfig> {
        let mut config = TurnConfig::new(self.caudal, self.turno, parse_start(&self.fecha)?)
            .with_programmed_volume_per_ha(self.vol_riego_p_ha)
            .with_compensation_factor(self.f_compensa)
            .with_timestamp_format(self.formato_fecha)
            .with_show_volume(self.volumen_tiempo != 0);
        if self.simular != 0 {
            config = config.with_simulation(self.vol_riego_p_ha);
        }
        if let Some(polarity) = self.polaridad {
            config = config.with_priority_polarity(polarity);
        }
        Ok(config)
    }

    pub fn tables(&self) -> Result<InputTables> {
        Ok(InputTables {
            padron: read_json_table(&self.padron)?.ok_or(TurnError::MissingTable("padron"))?,
            solicitud: read_json_table(&self.solicitud)?
                .ok_or(TurnError::MissingTable("solicitud"))?,
            modos: read_json_table(&self.modos)?.ok_or(TurnError::MissingTable("modos"))?,
            refuerzos: read_json_table(&self.refuerzos)?,
            reservorio: read_json_table(&self.reservorio)?,
        })
    }
}

/// JSON request in, JSON report out.
pub fn compute_turn_json(raw: &str) -> Result<String> {
    let request = TurnRequest::from_json(raw)?;
    let config = request.config()?;
    let outcome = compute_turn_from_tables(&request.tables()?, &config)?;
    TurnReport::build(&outcome, &config)?.to_json()
}
