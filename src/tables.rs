//! Input tables → typed [`Snapshot`].
//!
//! Tables arrive as polars DataFrames (from Python) or as JSON (records, or
//! the column-oriented layout pandas emits by default). Numeric columns are
//! normalized with lazy casts, nulls take the column default, and every
//! relation between tables is resolved by identifier, never by row position.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use polars::prelude::*;
use serde_json::{Map, Value};

use crate::error::{Result, TurnError};
use crate::model::{
    AreaAdjustments, CanalId, DeliveryPriority, ModeEntry, Parcel, ParcelId, PriorityPolarity,
    ReinforcementSource, ReservoirEntry, ScopeMode, Snapshot, TransitTimes,
};
use crate::schema::{modos, padron, refuerzo, reservorio, solicitud};

/// Raw tables of one scheduling request.
#[derive(Debug, Clone)]
pub struct InputTables {
    pub padron: DataFrame,
    pub solicitud: DataFrame,
    pub modos: DataFrame,
    pub refuerzos: Option<DataFrame>,
    pub reservorio: Option<DataFrame>,
}

// ── JSON loading ────────────────────────────────────────────────────────────

/// Read one JSON table. `null`, an empty array or an empty object yield `None`.
///
/// A JSON string is parsed as the table's serialized form, which is how the
/// irrigation web client posts its tables.
pub fn read_json_table(value: &Value) -> Result<Option<DataFrame>> {
    match value {
        Value::Null => Ok(None),
        Value::String(raw) => {
            let inner: Value = serde_json::from_str(raw)?;
            read_json_table(&inner)
        }
        Value::Array(rows) if rows.is_empty() => Ok(None),
        Value::Array(_) => {
            let bytes = serde_json::to_vec(value)?;
            let df = JsonReader::new(Cursor::new(bytes))
                .infer_schema_len(None)
                .finish()?;
            Ok(Some(df))
        }
        Value::Object(columns) if columns.is_empty() => Ok(None),
        Value::Object(columns) => read_json_table(&Value::Array(columns_to_records(columns)?)),
        other => Err(TurnError::InvalidData(format!(
            "expected a table, got JSON {}",
            json_kind(other)
        ))),
    }
}

/// `{"col": {"0": v, "1": w}}` → `[{"col": v}, {"col": w}]`, rows in index order.
fn columns_to_records(columns: &Map<String, Value>) -> Result<Vec<Value>> {
    let mut rows: BTreeMap<RowKey, Map<String, Value>> = BTreeMap::new();
    for (name, cells) in columns {
        let cells = cells.as_object().ok_or_else(|| {
            TurnError::InvalidData(format!("column '{name}' is not an index → value object"))
        })?;
        for (index, cell) in cells {
            rows.entry(RowKey::parse(index))
                .or_default()
                .insert(name.clone(), cell.clone());
        }
    }
    Ok(rows.into_values().map(Value::Object).collect())
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowKey {
    Position(i64),
    Label(String),
}

impl RowKey {
    fn parse(raw: &str) -> Self {
        raw.parse()
            .map(RowKey::Position)
            .unwrap_or_else(|_| RowKey::Label(raw.to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Snapshot assembly ───────────────────────────────────────────────────────

/// Build the typed snapshot, joining every table by its identifier.
pub fn snapshot_from_tables(
    tables: &InputTables,
    polarity: Option<PriorityPolarity>,
) -> Result<Snapshot> {
    let mut parcels = read_parcels(&tables.padron)?;
    let mut requests = read_requests(&tables.solicitud)?;

    for parcel in &mut parcels {
        parcel.adjustments = requests.remove(&parcel.id).ok_or_else(|| {
            TurnError::KeyMismatch(format!("parcel '{}' has no irrigation request", parcel.id))
        })?;
    }
    if let Some(orphan) = requests.keys().next() {
        return Err(TurnError::KeyMismatch(format!(
            "irrigation request for unknown parcel '{orphan}'"
        )));
    }

    let networks = network_ids(&tables.padron, padron::NETWORK_ID)?;
    let reinforcements = match &tables.refuerzos {
        Some(df) => read_reinforcements(df, networks.as_ref())?,
        None => Vec::new(),
    };
    let reservoirs = match &tables.reservorio {
        Some(df) => read_reservoirs(df, networks.as_ref())?,
        None => Vec::new(),
    };

    let canals: BTreeSet<CanalId> = parcels.iter().map(|p| p.canal).collect();
    let modes = read_modes(&tables.modos, polarity, &canals)?;

    Ok(Snapshot {
        parcels,
        modes,
        reinforcements,
        reservoirs,
    })
}

fn read_parcels(df: &DataFrame) -> Result<Vec<Parcel>> {
    const TABLE: &str = "padron";
    require_columns(df, TABLE, &padron::REQUIRED)?;

    let df = normalize_numeric(
        df,
        TABLE,
        &[
            (padron::REGISTERED_AREA, 0.0),
            (padron::HA_SI, 1.0),
            (padron::TPO_REC_TOMA, 0.0),
            (padron::TPO_REC_CABEZA_COLA, 0.0),
            (padron::TPO_REC_COLA_CABEZA, 0.0),
            (padron::TPO_DESCUELGUE, 0.0),
        ],
    )?;

    let ids = string_column(&df, padron::PARCEL_ID)?;
    let canals = int_column(&df, TABLE, padron::CANAL)?;
    let subgroups = int_column(&df, TABLE, padron::SUBGROUP)?;
    let groups = int_column(&df, TABLE, padron::GROUP)?;
    let area = float_column(&df, padron::REGISTERED_AREA)?;
    let ha_si = float_column(&df, padron::HA_SI)?;
    let transit: Vec<Vec<f64>> = padron::TRANSIT
        .iter()
        .map(|name| float_column(&df, name))
        .collect::<Result<_>>()?;
    let cc = optional_string_column(&df, padron::CC)?;
    let pp = optional_string_column(&df, padron::PP)?;

    let mut seen = BTreeSet::new();
    let mut parcels = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let id = required(&ids[i], TABLE, padron::PARCEL_ID, i)?.clone();
        if !seen.insert(id.clone()) {
            return Err(TurnError::KeyMismatch(format!("duplicate parcel id '{id}'")));
        }
        let mut parcel = Parcel::new(
            id,
            *required(&canals[i], TABLE, padron::CANAL, i)?,
            *required(&subgroups[i], TABLE, padron::SUBGROUP, i)?,
            *required(&groups[i], TABLE, padron::GROUP, i)?,
            area[i],
        )
        .with_index(i)
        .with_transit(TransitTimes {
            toma: transit[0][i],
            cabeza_cola: transit[1][i],
            cola_cabeza: transit[2][i],
            descuelgue: transit[3][i],
        })
        .with_codes(cc[i].clone().unwrap_or_default(), pp[i].clone().unwrap_or_default());
        parcel.enabled = ha_si[i];
        parcels.push(parcel);
    }
    Ok(parcels)
}

fn read_requests(df: &DataFrame) -> Result<BTreeMap<ParcelId, AreaAdjustments>> {
    const TABLE: &str = "solicitud";
    require_columns(df, TABLE, &[solicitud::PARCEL_ID])?;

    let df = normalize_numeric(
        df,
        TABLE,
        &[
            (solicitud::SUP_AD, 0.0),
            (solicitud::SUP_RES, 0.0),
            (solicitud::SUP_REC, 0.0),
            (solicitud::SUP_CED, 0.0),
            (solicitud::HA_ACTIVA, 1.0),
        ],
    )?;

    let ids = string_column(&df, solicitud::PARCEL_ID)?;
    let columns: Vec<Vec<f64>> = solicitud::ADJUSTMENTS
        .iter()
        .map(|name| float_column(&df, name))
        .collect::<Result<_>>()?;
    let active = float_column(&df, solicitud::HA_ACTIVA)?;

    let mut requests = BTreeMap::new();
    for i in 0..df.height() {
        let id = required(&ids[i], TABLE, solicitud::PARCEL_ID, i)?.clone();
        let adjustments = AreaAdjustments {
            additional: columns[0][i],
            restricted: columns[1][i],
            received: columns[2][i],
            ceded: columns[3][i],
            active_factor: active[i],
        };
        if requests.insert(id.clone(), adjustments).is_some() {
            return Err(TurnError::KeyMismatch(format!(
                "more than one irrigation request for parcel '{id}'"
            )));
        }
    }
    Ok(requests)
}

fn read_reinforcements(
    df: &DataFrame,
    networks: Option<&BTreeSet<String>>,
) -> Result<Vec<ReinforcementSource>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    require_columns(df, "refuerzos", &[refuerzo::FLOW, refuerzo::DURATION])?;
    check_network_refs(df, "refuerzos", refuerzo::NETWORK_ID, networks)?;

    let df = normalize_numeric(
        df,
        "refuerzos",
        &[(refuerzo::FLOW, 0.0), (refuerzo::DURATION, 0.0)],
    )?;
    let flow = float_column(&df, refuerzo::FLOW)?;
    let duration = float_column(&df, refuerzo::DURATION)?;
    Ok(flow
        .into_iter()
        .zip(duration)
        .map(|(flow, duration)| ReinforcementSource { flow, duration })
        .collect())
}

fn read_reservoirs(
    df: &DataFrame,
    networks: Option<&BTreeSet<String>>,
) -> Result<Vec<ReservoirEntry>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    require_columns(df, "reservorio", &[reservorio::VOLUME])?;
    check_network_refs(df, "reservorio", reservorio::NETWORK_ID, networks)?;

    let df = normalize_numeric(df, "reservorio", &[(reservorio::VOLUME, 0.0)])?;
    Ok(float_column(&df, reservorio::VOLUME)?
        .into_iter()
        .map(|volume| ReservoirEntry { volume })
        .collect())
}

fn read_modes(
    df: &DataFrame,
    polarity: Option<PriorityPolarity>,
    canals: &BTreeSet<CanalId>,
) -> Result<BTreeMap<CanalId, ModeEntry>> {
    const TABLE: &str = "modos";
    require_columns(
        df,
        TABLE,
        &[modos::CANAL, modos::PRIORITY, modos::SUBGROUP_MODE, modos::GROUP_MODE],
    )?;

    let canal_col = int_column(df, TABLE, modos::CANAL)?;
    let subgroup_col = int_column(df, TABLE, modos::SUBGROUP_MODE)?;
    let group_col = int_column(df, TABLE, modos::GROUP_MODE)?;
    let priority_col = priority_cells(df, TABLE)?;

    let mut modes = BTreeMap::new();
    for i in 0..df.height() {
        let canal = *required(&canal_col[i], TABLE, modos::CANAL, i)?;
        if !canals.contains(&canal) {
            tracing::warn!("mode row for unknown canal {canal} ignored");
            continue;
        }
        let (Some(cell), Some(sg_flag), Some(g_flag)) =
            (&priority_col[i], subgroup_col[i], group_col[i])
        else {
            tracing::warn!("incomplete mode row for canal {canal}, treated as missing");
            continue;
        };

        let priority = resolve_priority(canal, cell, polarity)?;
        let subgroup_mode = ScopeMode::from_flag(sg_flag).ok_or_else(|| {
            TurnError::InvalidData(format!("canal {canal}: subgroup mode flag {sg_flag}"))
        })?;
        let group_mode = ScopeMode::from_flag(g_flag).ok_or_else(|| {
            TurnError::InvalidData(format!("canal {canal}: group mode flag {g_flag}"))
        })?;

        let entry = ModeEntry::new(priority, group_mode, subgroup_mode);
        if modes.insert(canal, entry).is_some() {
            return Err(TurnError::KeyMismatch(format!(
                "more than one mode row for canal {canal}"
            )));
        }
    }
    Ok(modes)
}

/// A delivery-priority cell, either a label or a numeric flag.
#[derive(Debug, Clone)]
enum PriorityCell {
    Label(String),
    Flag(i64),
}

fn priority_cells(df: &DataFrame, table: &'static str) -> Result<Vec<Option<PriorityCell>>> {
    if let Ok(labels) = df.column(modos::PRIORITY)?.str() {
        return Ok(labels
            .into_iter()
            .map(|v| v.map(|s| PriorityCell::Label(s.to_string())))
            .collect());
    }
    Ok(int_column(df, table, modos::PRIORITY)?
        .into_iter()
        .map(|v| v.map(PriorityCell::Flag))
        .collect())
}

fn resolve_priority(
    canal: CanalId,
    cell: &PriorityCell,
    polarity: Option<PriorityPolarity>,
) -> Result<DeliveryPriority> {
    let flag = match cell {
        PriorityCell::Label(label) => {
            if let Some(priority) = DeliveryPriority::from_label(label) {
                return Ok(priority);
            }
            label.trim().parse::<i64>().map_err(|_| TurnError::AmbiguousPriority {
                canal,
                value: label.clone(),
            })?
        }
        PriorityCell::Flag(flag) => *flag,
    };
    let polarity = polarity.ok_or_else(|| TurnError::AmbiguousPriority {
        canal,
        value: format!("numeric flag {flag} without a configured polarity"),
    })?;
    polarity.resolve(flag).ok_or_else(|| TurnError::AmbiguousPriority {
        canal,
        value: flag.to_string(),
    })
}

// ── Network references ──────────────────────────────────────────────────────

fn network_ids(df: &DataFrame, column: &str) -> Result<Option<BTreeSet<String>>> {
    if df.column(column).is_err() {
        return Ok(None);
    }
    Ok(Some(string_column(df, column)?.into_iter().flatten().collect()))
}

/// Reinforcement and reservoir rows that name a network must name one of the registry's.
fn check_network_refs(
    df: &DataFrame,
    table: &'static str,
    column: &str,
    networks: Option<&BTreeSet<String>>,
) -> Result<()> {
    let Some(refs) = network_ids(df, column)? else {
        return Ok(());
    };
    let Some(networks) = networks else {
        if let Some(first) = refs.iter().next() {
            return Err(TurnError::KeyMismatch(format!(
                "{table} references network '{first}' but the registry carries no network id"
            )));
        }
        return Ok(());
    };
    match refs.iter().find(|r| !networks.contains(*r)) {
        Some(unknown) => Err(TurnError::KeyMismatch(format!(
            "{table} references unknown network '{unknown}'"
        ))),
        None => Ok(()),
    }
}

// ── Column helpers ──────────────────────────────────────────────────────────

fn require_columns(df: &DataFrame, table: &'static str, required: &[&'static str]) -> Result<()> {
    for &column in required {
        if df.column(column).is_err() {
            return Err(TurnError::MissingColumn { table, column });
        }
    }
    Ok(())
}

/// Cast numeric columns to Float64 and fill nulls with their default.
/// Absent columns are created holding the default. A cell that is present
/// but does not read as a number is an error, never a default.
fn normalize_numeric(
    df: &DataFrame,
    table: &'static str,
    columns: &[(&str, f64)],
) -> Result<DataFrame> {
    let schema = df.schema();
    let mut exprs: Vec<Expr> = Vec::with_capacity(columns.len());
    for &(name, default) in columns {
        if schema.contains(name) {
            strict_float(df, table, name)?;
            exprs.push(
                col(name)
                    .cast(DataType::Float64)
                    .fill_null(lit(default))
                    .alias(name),
            );
        } else {
            exprs.push(lit(default).alias(name));
        }
    }
    Ok(df.clone().lazy().with_columns(exprs).collect()?)
}

/// Float64 view of a column; fails on the first non-null cell the cast turns into null.
fn strict_float(df: &DataFrame, table: &'static str, name: &str) -> Result<Series> {
    let raw = df.column(name)?.as_materialized_series();
    let cast = raw.cast(&DataType::Float64)?;
    let present = raw.is_not_null();
    let lost = cast.is_null();
    let bad_row = present
        .into_iter()
        .zip(lost.into_iter())
        .position(|(present, lost)| present == Some(true) && lost == Some(true));
    if let Some(row) = bad_row {
        let value = raw.get(row).map(|v| v.to_string()).unwrap_or_default();
        return Err(TurnError::InvalidData(format!(
            "{table}.{name} at row {row}: {value} is not a number"
        )));
    }
    Ok(cast)
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = df.column(name)?.f64()?;
    Ok(values.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Integer ids and flags. Fractional values are rejected rather than truncated.
fn int_column(df: &DataFrame, table: &'static str, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df.column(name)?;
    if column.dtype().is_integer() {
        let cast = column.cast(&DataType::Int64)?;
        return Ok(cast.i64()?.into_iter().collect());
    }
    let floats = strict_float(df, table, name)?;
    floats
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(x) if !x.is_finite() || x.fract() != 0.0 => Err(TurnError::InvalidData(format!(
                "{table}.{name} at row {row}: {x} is not an integer"
            ))),
            Some(x) => Ok(Some(x as i64)),
            None => Ok(None),
        })
        .collect()
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let cast = df.column(name)?.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect())
}

fn optional_string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    string_column(df, name)
}

fn required<'a, T>(value: &'a Option<T>, table: &str, column: &str, row: usize) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| TurnError::InvalidData(format!("{table}.{column} is null at row {row}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn padron_df() -> DataFrame {
        df!(
            padron::PARCEL_ID => ["a", "b", "c"],
            padron::CANAL => [1i64, 1, 2],
            padron::SUBGROUP => [1i64, 1, 2],
            padron::GROUP => [1i64, 1, 1],
            padron::REGISTERED_AREA => [10.0, 20.0, 30.0],
            padron::TPO_DESCUELGUE => [5.0, 0.0, 0.0]
        )
        .unwrap()
    }

    fn solicitud_df() -> DataFrame {
        df!(
            solicitud::PARCEL_ID => ["c", "a", "b"],
            solicitud::SUP_AD => [1.0, 0.0, 2.0],
            solicitud::HA_ACTIVA => [1.0, 1.0, 0.5]
        )
        .unwrap()
    }

    fn modos_df() -> DataFrame {
        df!(
            modos::CANAL => [1i64, 2],
            modos::PRIORITY => ["cabeza", "cola"],
            modos::SUBGROUP_MODE => [1i64, 0],
            modos::GROUP_MODE => [0i64, 0]
        )
        .unwrap()
    }

    fn tables() -> InputTables {
        InputTables {
            padron: padron_df(),
            solicitud: solicitud_df(),
            modos: modos_df(),
            refuerzos: None,
            reservorio: None,
        }
    }

    #[test]
    fn requests_join_by_parcel_id_not_position() {
        let snapshot = snapshot_from_tables(&tables(), None).unwrap();
        let b = snapshot.parcels.iter().find(|p| p.id == "b").unwrap();
        assert_eq!(b.adjustments.additional, 2.0);
        assert_eq!(b.adjustments.active_factor, 0.5);
        let c = snapshot.parcels.iter().find(|p| p.id == "c").unwrap();
        assert_eq!(c.adjustments.additional, 1.0);
        assert_eq!(c.index, 2);
        assert_eq!(snapshot.parcels[0].transit.descuelgue, 5.0);
        assert_eq!(snapshot.parcels[0].enabled, 1.0);
    }

    #[test]
    fn parcel_without_request_is_a_key_mismatch() {
        let mut t = tables();
        t.solicitud = df!(solicitud::PARCEL_ID => ["a", "b"]).unwrap();
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::KeyMismatch(_))
        ));
    }

    #[test]
    fn request_for_unknown_parcel_is_a_key_mismatch() {
        let mut t = tables();
        t.solicitud = df!(solicitud::PARCEL_ID => ["a", "b", "c", "z"]).unwrap();
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::KeyMismatch(_))
        ));
    }

    #[test]
    fn missing_required_column() {
        let mut t = tables();
        t.padron = df!(padron::PARCEL_ID => ["a"]).unwrap();
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::MissingColumn {
                table: "padron",
                column: padron::CANAL
            })
        ));
    }

    #[test]
    fn unreadable_area_is_an_error_not_zero() {
        let mut t = tables();
        t.padron = df!(
            padron::PARCEL_ID => ["a", "b", "c"],
            padron::CANAL => [1i64, 1, 2],
            padron::SUBGROUP => [1i64, 1, 2],
            padron::GROUP => [1i64, 1, 1],
            padron::REGISTERED_AREA => ["10", "diez", "30"]
        )
        .unwrap();
        match snapshot_from_tables(&t, None) {
            Err(TurnError::InvalidData(msg)) => {
                assert!(msg.contains("padron.sup_emp_reducida"), "{msg}");
                assert!(msg.contains("row 1"), "{msg}");
            }
            other => panic!("expected InvalidData, got {other:?}"),
        }
    }

    #[test]
    fn numeric_strings_still_read() {
        let mut t = tables();
        t.padron = df!(
            padron::PARCEL_ID => ["a", "b", "c"],
            padron::CANAL => ["1", "1", "2"],
            padron::SUBGROUP => [1i64, 1, 2],
            padron::GROUP => [1i64, 1, 1],
            padron::REGISTERED_AREA => ["10", "20.5", "30"]
        )
        .unwrap();
        let snapshot = snapshot_from_tables(&t, None).unwrap();
        assert_eq!(snapshot.parcels[1].registered_area, 20.5);
        assert_eq!(snapshot.parcels[2].canal, 2);
    }

    #[test]
    fn unreadable_request_adjustment_is_an_error() {
        let mut t = tables();
        t.solicitud = df!(
            solicitud::PARCEL_ID => ["a", "b", "c"],
            solicitud::HA_ACTIVA => ["1", "?", "1"]
        )
        .unwrap();
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::InvalidData(_))
        ));
    }

    #[test]
    fn fractional_canal_id_is_rejected() {
        let mut t = tables();
        t.padron = df!(
            padron::PARCEL_ID => ["a", "b"],
            padron::CANAL => [1.0, 1.7],
            padron::SUBGROUP => [1i64, 1],
            padron::GROUP => [1i64, 1],
            padron::REGISTERED_AREA => [10.0, 20.0]
        )
        .unwrap();
        t.solicitud = df!(solicitud::PARCEL_ID => ["a", "b"]).unwrap();
        match snapshot_from_tables(&t, None) {
            Err(TurnError::InvalidData(msg)) => assert!(msg.contains("orden_cauce"), "{msg}"),
            other => panic!("expected InvalidData, got {other:?}"),
        }

        t.padron = df!(
            padron::PARCEL_ID => ["a", "b"],
            padron::CANAL => [1.0, 2.0],
            padron::SUBGROUP => [1i64, 1],
            padron::GROUP => [1i64, 1],
            padron::REGISTERED_AREA => [10.0, 20.0]
        )
        .unwrap();
        let snapshot = snapshot_from_tables(&t, None).unwrap();
        assert_eq!(snapshot.parcels[1].canal, 2);
    }

    #[test]
    fn fractional_mode_flag_is_rejected() {
        let mut t = tables();
        t.modos = df!(
            modos::CANAL => [1i64, 2],
            modos::PRIORITY => ["cabeza", "cola"],
            modos::SUBGROUP_MODE => [0.5, 0.0],
            modos::GROUP_MODE => [0i64, 0]
        )
        .unwrap();
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::InvalidData(_))
        ));
    }

    #[test]
    fn modes_read_labels() {
        let snapshot = snapshot_from_tables(&tables(), None).unwrap();
        assert_eq!(snapshot.modes[&1].priority, DeliveryPriority::Head);
        assert_eq!(snapshot.modes[&1].subgroup_mode, ScopeMode::Sequential);
        assert_eq!(snapshot.modes[&2].priority, DeliveryPriority::Tail);
        assert_eq!(snapshot.modes[&2].group_mode, ScopeMode::Independent);
    }

    #[test]
    fn numeric_priority_requires_polarity() {
        let mut t = tables();
        t.modos = df!(
            modos::CANAL => [1i64, 2],
            modos::PRIORITY => [1i64, 0],
            modos::SUBGROUP_MODE => [0i64, 0],
            modos::GROUP_MODE => [0i64, 0]
        )
        .unwrap();
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::AmbiguousPriority { canal: 1, .. })
        ));

        let snapshot = snapshot_from_tables(&t, Some(PriorityPolarity::OneIsTail)).unwrap();
        assert_eq!(snapshot.modes[&1].priority, DeliveryPriority::Tail);
        assert_eq!(snapshot.modes[&2].priority, DeliveryPriority::Head);
    }

    #[test]
    fn duplicate_mode_rows_rejected() {
        let mut t = tables();
        t.modos = df!(
            modos::CANAL => [1i64, 1],
            modos::PRIORITY => ["head", "tail"],
            modos::SUBGROUP_MODE => [0i64, 0],
            modos::GROUP_MODE => [0i64, 0]
        )
        .unwrap();
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::KeyMismatch(_))
        ));
    }

    #[test]
    fn reinforcement_for_unknown_network_rejected() {
        let mut t = tables();
        t.padron = padron_df()
            .lazy()
            .with_column(lit("north").alias(padron::NETWORK_ID))
            .collect()
            .unwrap();
        t.refuerzos = Some(
            df!(
                refuerzo::FLOW => [10.0],
                refuerzo::DURATION => [2.0],
                refuerzo::NETWORK_ID => ["south"]
            )
            .unwrap(),
        );
        assert!(matches!(
            snapshot_from_tables(&t, None),
            Err(TurnError::KeyMismatch(_))
        ));

        t.refuerzos = Some(
            df!(
                refuerzo::FLOW => [10.0],
                refuerzo::DURATION => [2.0],
                refuerzo::NETWORK_ID => ["north"]
            )
            .unwrap(),
        );
        let snapshot = snapshot_from_tables(&t, None).unwrap();
        assert_eq!(
            snapshot.reinforcements,
            vec![ReinforcementSource {
                flow: 10.0,
                duration: 2.0
            }]
        );
    }

    #[test]
    fn json_records_and_column_layout_agree() {
        let records = json!([
            {"idPadron": "a", "sup_ad": 1.5},
            {"idPadron": "b", "sup_ad": null},
        ]);
        let columns = json!({
            "idPadron": {"0": "a", "1": "b"},
            "sup_ad": {"0": 1.5, "1": null},
        });
        let from_records = read_requests(&read_json_table(&records).unwrap().unwrap()).unwrap();
        let from_columns = read_requests(&read_json_table(&columns).unwrap().unwrap()).unwrap();
        assert_eq!(from_records, from_columns);
        assert_eq!(from_records["b"].additional, 0.0);
    }

    #[test]
    fn json_string_and_empty_tables() {
        let nested = Value::String(r#"[{"volumen": 120}]"#.to_string());
        let df = read_json_table(&nested).unwrap().unwrap();
        assert_eq!(read_reservoirs(&df, None).unwrap()[0].volume, 120.0);
        assert!(read_json_table(&json!([])).unwrap().is_none());
        assert!(read_json_table(&Value::Null).unwrap().is_none());
        assert!(read_json_table(&json!(3)).is_err());
    }
}
