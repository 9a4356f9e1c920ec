//! Output tables of a computed turn.
//!
//! Field labels are the ones the irrigation web views consume. Numbers are
//! rounded to one decimal here and only here; durations are rendered as
//! `H:MM:SS`, timestamps in the configured [`TimestampFormat`](crate::model::TimestampFormat).

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Serialize, Serializer};

use crate::error::{Result, TurnError};
use crate::model::{CanalId, ParcelId, TurnConfig};
use crate::schema::turn_frame;
use crate::turn::TurnOutcome;

fn round1<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to_tenth(*value))
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Fractional hours as `H:MM:SS`, hours unbounded.
pub fn format_hours(hours: f64) -> String {
    let total = (hours * 3600.0).round() as i64;
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Rows keyed by parcel id, serialized in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRows<T>(pub Vec<(ParcelId, T)>);

impl<T: Serialize> Serialize for ParcelRows<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(id, row)| (id, row)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRow {
    #[serde(rename = "CC")]
    pub cc: String,
    #[serde(rename = "PP")]
    pub pp: String,
    #[serde(rename = "Caudal", serialize_with = "round1")]
    pub flow: f64,
    #[serde(rename = "Volumen", serialize_with = "round1")]
    pub volume: f64,
    #[serde(rename = "Inicio")]
    pub start: String,
    #[serde(rename = "Tiempo")]
    pub duration: String,
    #[serde(rename = "Fin")]
    pub end: String,
    pub id_parcela: ParcelId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterAccountRow {
    #[serde(rename = "CC")]
    pub cc: String,
    #[serde(rename = "PP")]
    pub pp: String,
    #[serde(rename = "Agua Programada", serialize_with = "round1")]
    pub programmed: f64,
    #[serde(rename = "Agua Entregada", serialize_with = "round1")]
    pub delivered: f64,
    #[serde(rename = "Balance", serialize_with = "round1")]
    pub balance: f64,
    #[serde(rename = "Volumen Entregado", serialize_with = "round1")]
    pub delivered_volume: f64,
    pub id_parcela: ParcelId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRow {
    #[serde(rename = "Caudal", serialize_with = "round1")]
    pub flow: f64,
    #[serde(rename = "Tpo de Turnado")]
    pub duration: String,
    #[serde(rename = "Sup de Riego", serialize_with = "round1")]
    pub area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRow {
    #[serde(rename = "Sup empadronada", serialize_with = "round1")]
    pub registered_area: f64,
    #[serde(rename = "Sup de distribucion", serialize_with = "round1")]
    pub distribution_area: f64,
    #[serde(rename = "Sup de riego", serialize_with = "round1")]
    pub irrigation_area: f64,
    #[serde(rename = "Ctd de padrones")]
    pub parcels: usize,
    #[serde(rename = "Tiempo de red", serialize_with = "round1")]
    pub network_time: f64,
    #[serde(rename = "Tpo x ha")]
    pub time_per_ha: String,
    #[serde(rename = "Inicio")]
    pub start: String,
    #[serde(rename = "Duracion")]
    pub duration: String,
    #[serde(rename = "Fin")]
    pub end: String,
    #[serde(rename = "Vol x ha", serialize_with = "round1")]
    pub volume_per_ha: f64,
    #[serde(rename = "Volumen", serialize_with = "round1")]
    pub volume: f64,
    #[serde(rename = "Coef de riego", serialize_with = "round1")]
    pub delivery_coefficient: f64,
    #[serde(rename = "Caudal", serialize_with = "round1")]
    pub flow: f64,
}

/// Network-wide entitlement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkRow {
    #[serde(rename = "Sup de riego", serialize_with = "round1")]
    pub area: f64,
    #[serde(rename = "Tiempo de red", serialize_with = "round1")]
    pub network_time: f64,
    #[serde(rename = "Turno neto")]
    pub net_turn: String,
    #[serde(rename = "Vol base x ha", serialize_with = "round1")]
    pub base_volume_per_ha: f64,
    #[serde(rename = "Refuerzo", serialize_with = "round1")]
    pub reinforcement: f64,
    #[serde(rename = "Reservorio", serialize_with = "round1")]
    pub reservoir: f64,
    #[serde(rename = "Vol x ha", serialize_with = "round1")]
    pub volume_per_ha: f64,
    #[serde(rename = "Tpo x ha")]
    pub time_per_ha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReport {
    #[serde(rename = "cuentaAgua")]
    pub water_account: BTreeMap<CanalId, ParcelRows<WaterAccountRow>>,
    #[serde(rename = "cuadro")]
    pub turn_table: BTreeMap<CanalId, ParcelRows<TurnRow>>,
    #[serde(rename = "caudales")]
    pub flows: BTreeMap<CanalId, FlowRow>,
    pub dashboard: BTreeMap<CanalId, DashboardRow>,
    #[serde(rename = "red")]
    pub network: NetworkRow,
    /// Canals scheduled without a mode row.
    pub fallbacks: Vec<CanalId>,
}

impl TurnReport {
    pub fn build(outcome: &TurnOutcome, config: &TurnConfig) -> Result<Self> {
        let format = config.timestamp_format;
        let mut water_account = BTreeMap::new();
        let mut turn_table = BTreeMap::new();
        let mut flows = BTreeMap::new();
        let mut dashboard = BTreeMap::new();

        for schedule in &outcome.canals {
            let canal = schedule.window.canal;
            let aggregate = outcome.hierarchy.canals.get(&canal).ok_or_else(|| {
                TurnError::KeyMismatch(format!("schedule for canal {canal} without aggregate"))
            })?;

            let rows = schedule
                .entries
                .iter()
                .map(|e| {
                    let row = TurnRow {
                        cc: e.cc.clone(),
                        pp: e.pp.clone(),
                        flow: e.flow,
                        volume: if config.show_volume { e.volume } else { 0.0 },
                        start: format.format(e.start),
                        duration: format_hours(e.duration),
                        end: format.format(e.end),
                        id_parcela: e.parcel_id.clone(),
                    };
                    (e.parcel_id.clone(), row)
                })
                .collect();
            turn_table.insert(canal, ParcelRows(rows));

            let ledger = schedule
                .ledger
                .iter()
                .map(|w| {
                    let row = WaterAccountRow {
                        cc: w.cc.clone(),
                        pp: w.pp.clone(),
                        programmed: w.programmed_depth,
                        delivered: w.delivered_depth,
                        balance: w.balance,
                        delivered_volume: w.delivered_volume,
                        id_parcela: w.parcel_id.clone(),
                    };
                    (w.parcel_id.clone(), row)
                })
                .collect();
            water_account.insert(canal, ParcelRows(ledger));

            flows.insert(
                canal,
                FlowRow {
                    flow: schedule.flow,
                    duration: format_hours(schedule.window.duration),
                    area: schedule.area,
                },
            );

            dashboard.insert(
                canal,
                DashboardRow {
                    registered_area: aggregate.area.registered,
                    distribution_area: aggregate.area.distribution_area(),
                    irrigation_area: aggregate.area.irrigation,
                    parcels: aggregate.area.parcels,
                    network_time: outcome.network_times.get(&canal).copied().unwrap_or(0.0),
                    time_per_ha: format_hours(schedule.window.duration / schedule.area),
                    start: format.format(schedule.window.start),
                    duration: format_hours(schedule.window.duration),
                    end: format.format(schedule.window.end),
                    volume_per_ha: schedule.volume / schedule.area,
                    volume: schedule.volume,
                    delivery_coefficient: schedule.flow / schedule.area,
                    flow: schedule.flow,
                },
            );
        }

        let volume = &outcome.volume;
        Ok(Self {
            water_account,
            turn_table,
            flows,
            dashboard,
            network: NetworkRow {
                area: volume.total_area,
                network_time: volume.network_time,
                net_turn: format_hours(volume.net_turn),
                base_volume_per_ha: volume.base_volume_per_ha,
                reinforcement: volume.reinforcement_capacity,
                reservoir: volume.reservoir_volume,
                volume_per_ha: volume.volume_per_ha,
                time_per_ha: format_hours(volume.time_per_ha),
            },
            fallbacks: outcome.fallbacks(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One row per parcel, all canals, in canal then delivery order.
/// Start and end are millisecond datetimes; numbers are not rounded.
pub fn turn_table_frame(outcome: &TurnOutcome) -> Result<DataFrame> {
    let rows: Vec<(CanalId, &crate::materialize::ScheduleEntry)> = outcome
        .canals
        .iter()
        .flat_map(|s| s.entries.iter().map(move |e| (s.window.canal, e)))
        .collect();

    let canals: Vec<i64> = rows.iter().map(|(c, _)| *c).collect();
    let ids: Vec<String> = rows.iter().map(|(_, e)| e.parcel_id.clone()).collect();
    let cc: Vec<String> = rows.iter().map(|(_, e)| e.cc.clone()).collect();
    let pp: Vec<String> = rows.iter().map(|(_, e)| e.pp.clone()).collect();
    let flow: Vec<f64> = rows.iter().map(|(_, e)| e.flow).collect();
    let volume: Vec<f64> = rows.iter().map(|(_, e)| e.volume).collect();
    let duration: Vec<f64> = rows.iter().map(|(_, e)| e.duration).collect();
    let start: Vec<i64> = rows
        .iter()
        .map(|(_, e)| e.start.and_utc().timestamp_millis())
        .collect();
    let end: Vec<i64> = rows
        .iter()
        .map(|(_, e)| e.end.and_utc().timestamp_millis())
        .collect();

    let datetime = DataType::Datetime(TimeUnit::Milliseconds, None);
    let df = DataFrame::new(vec![
        Column::new(turn_frame::CANAL.into(), &canals),
        Column::new(turn_frame::PARCEL_ID.into(), &ids),
        Column::new(turn_frame::CC.into(), &cc),
        Column::new(turn_frame::PP.into(), &pp),
        Column::new(turn_frame::FLOW.into(), &flow),
        Column::new(turn_frame::VOLUME.into(), &volume),
        Column::new(turn_frame::DURATION_H.into(), &duration),
        Series::new(turn_frame::START.into(), &start)
            .cast(&datetime)?
            .into(),
        Series::new(turn_frame::END.into(), &end).cast(&datetime)?.into(),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_one_decimal() {
        assert_eq!(round_to_tenth(2073.6499), 2073.6);
        assert_eq!(round_to_tenth(0.25), 0.3);
        assert_eq!(round_to_tenth(-1.04), -1.0);
    }

    #[test]
    fn hours_render_as_clock_durations() {
        assert_eq!(format_hours(12.0), "12:00:00");
        assert_eq!(format_hours(36.5), "36:30:00");
        assert_eq!(format_hours(0.24), "0:14:24");
        assert_eq!(format_hours(-0.5), "-0:30:00");
    }

    #[test]
    fn parcel_rows_keep_delivery_order() {
        let rows = ParcelRows(vec![
            ("z".to_string(), 1),
            ("a".to_string(), 2),
        ]);
        assert_eq!(serde_json::to_string(&rows).unwrap(), r#"{"z":1,"a":2}"#);
    }

    fn outcome() -> (TurnOutcome, TurnConfig) {
        use crate::model::{parse_start, Parcel, Snapshot};
        let snapshot = Snapshot {
            parcels: vec![
                Parcel::new("a", 1, 1, 1, 30.0)
                    .with_index(0)
                    .with_codes("01", "001"),
                Parcel::new("b", 1, 1, 1, 20.0).with_index(1),
            ],
            ..Default::default()
        };
        let config = TurnConfig::new(100.0, 10.0, parse_start("01-01-2022 06:00").unwrap());
        (crate::turn::compute_turn(&snapshot, &config).unwrap(), config)
    }

    #[test]
    fn report_uses_legacy_labels_and_rounds() {
        let (outcome, config) = outcome();
        let report = TurnReport::build(&outcome, &config).unwrap();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        let first = &json["cuadro"]["1"]["a"];
        assert_eq!(first["CC"], "01");
        assert_eq!(first["Inicio"], "2022-01-01T06:00:00");
        assert_eq!(first["Tiempo"], "6:00:00");
        assert_eq!(first["Fin"], "2022-01-01T12:00:00");
        assert_eq!(first["Caudal"], 100.0);
        assert_eq!(json["caudales"]["1"]["Tpo de Turnado"], "10:00:00");
        assert_eq!(json["dashboard"]["1"]["Ctd de padrones"], 2);
        assert_eq!(json["red"]["Vol x ha"], 1728.0);
        assert_eq!(json["fallbacks"], serde_json::json!([1]));
    }

    #[test]
    fn hidden_volume_reports_zero() {
        let (outcome, config) = outcome();
        let report = TurnReport::build(&outcome, &config.with_show_volume(false)).unwrap();
        let rows = &report.turn_table[&1].0;
        assert!(rows.iter().all(|(_, row)| row.volume == 0.0));
        assert!(report.water_account[&1].0.iter().all(|(_, w)| w.delivered_volume > 0.0));
    }

    #[test]
    fn turn_frame_has_one_row_per_parcel() {
        let (outcome, _) = outcome();
        let df = turn_table_frame(&outcome).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.column(turn_frame::START).unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        let ids: Vec<Option<&str>> = df
            .column(turn_frame::PARCEL_ID)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(ids, [Some("a"), Some("b")]);
    }
}
