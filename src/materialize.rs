//! Canal windows → cascading per-parcel schedule and water account.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{Result, TurnError};
use crate::model::{advance, Level, Parcel, ParcelId, DEPTH_SCALE};
use crate::modes::CanalWindow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub parcel_id: ParcelId,
    pub cc: String,
    pub pp: String,
    pub area: f64,
    pub flow: f64,
    pub volume: f64,
    /// Hours.
    pub duration: f64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterAccountEntry {
    pub parcel_id: ParcelId,
    pub cc: String,
    pub pp: String,
    pub programmed_depth: f64,
    pub delivered_depth: f64,
    pub balance: f64,
    pub delivered_volume: f64,
}

/// What a canal receives for the turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allotment {
    /// Canal irrigation area.
    pub area: f64,
    pub volume_per_ha: f64,
    pub flow: f64,
    /// Drives the programmed side of the water account.
    pub programmed_volume_per_ha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanalSchedule {
    pub window: CanalWindow,
    pub area: f64,
    pub volume: f64,
    pub flow: f64,
    /// Delivery order.
    pub entries: Vec<ScheduleEntry>,
    pub ledger: Vec<WaterAccountEntry>,
}

/// Expand a canal window over its ordered parcels.
///
/// Each parcel gets time in proportion to its area; the first starts with
/// the canal window and each next one where the previous ended.
pub fn materialize_canal(
    window: &CanalWindow,
    ordered: &[&Parcel],
    allotment: &Allotment,
) -> Result<CanalSchedule> {
    if !(allotment.area.is_finite() && allotment.area > 0.0) {
        return Err(TurnError::ZeroArea {
            level: Level::Canal,
            id: window.canal.to_string(),
        });
    }

    let mut entries = Vec::with_capacity(ordered.len());
    let mut ledger = Vec::with_capacity(ordered.len());
    let mut cursor = window.start;

    for parcel in ordered {
        let area = parcel.irrigation_area();
        let volume = area * allotment.volume_per_ha;
        let duration = area * window.duration / allotment.area;
        let start = cursor;
        let end = advance(start, duration)?;
        cursor = end;

        entries.push(ScheduleEntry {
            parcel_id: parcel.id.clone(),
            cc: parcel.cc.clone(),
            pp: parcel.pp.clone(),
            area,
            flow: allotment.flow,
            volume,
            duration,
            start,
            end,
        });
        ledger.push(water_account(parcel, volume, allotment.programmed_volume_per_ha));
    }

    Ok(CanalSchedule {
        window: window.clone(),
        area: allotment.area,
        volume: allotment.area * allotment.volume_per_ha,
        flow: allotment.flow,
        entries,
        ledger,
    })
}

fn water_account(parcel: &Parcel, delivered_volume: f64, programmed_volume_per_ha: f64) -> WaterAccountEntry {
    let programmed_depth = programmed_volume_per_ha * parcel.irrigation_area() / DEPTH_SCALE;
    let delivered_depth = delivered_volume / DEPTH_SCALE;
    WaterAccountEntry {
        parcel_id: parcel.id.clone(),
        cc: parcel.cc.clone(),
        pp: parcel.pp.clone(),
        programmed_depth,
        delivered_depth,
        balance: programmed_depth - delivered_depth,
        delivered_volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{hours_to_delta, parse_start, ModeEntry};

    fn window(duration: f64) -> CanalWindow {
        let start = parse_start("01-01-2022 06:00").unwrap();
        CanalWindow {
            canal: 1,
            subgroup: 1,
            group: 1,
            mode: ModeEntry::FALLBACK,
            fallback: false,
            duration,
            start,
            end: start + hours_to_delta(duration).unwrap(),
        }
    }

    fn allotment(area: f64) -> Allotment {
        Allotment {
            area,
            volume_per_ha: 2000.0,
            flow: 50.0,
            programmed_volume_per_ha: 2500.0,
        }
    }

    #[test]
    fn single_parcel_takes_the_whole_window() {
        let p = Parcel::new("solo", 1, 1, 1, 37.3);
        let w = window(13.7);
        let s = materialize_canal(&w, &[&p], &allotment(37.3)).unwrap();
        assert_eq!(s.entries.len(), 1);
        assert_eq!(s.entries[0].start, w.start);
        assert_eq!(s.entries[0].end, w.end);
    }

    #[test]
    fn parcels_cascade_without_gaps() {
        let parcels = [
            Parcel::new("a", 1, 1, 1, 10.0),
            Parcel::new("b", 1, 1, 1, 20.0),
            Parcel::new("c", 1, 1, 1, 30.0),
        ];
        let ordered: Vec<&Parcel> = parcels.iter().collect();
        let w = window(12.0);
        let s = materialize_canal(&w, &ordered, &allotment(60.0)).unwrap();

        assert_eq!(s.entries[0].start, w.start);
        for pair in s.entries.windows(2) {
            assert_eq!(pair[1].start, pair[0].end);
        }
        assert_eq!(s.entries[2].end, w.end);
        assert_eq!(s.entries[1].duration, 4.0);

        let volume: f64 = s.entries.iter().map(|e| e.volume).sum();
        assert!((volume - s.volume).abs() < 1e-6);
        assert!(s.entries.iter().all(|e| e.flow == 50.0));
    }

    #[test]
    fn water_account_compares_programmed_and_delivered_depth() {
        let p = Parcel::new("a", 1, 1, 1, 10.0);
        let s = materialize_canal(&window(1.0), &[&p], &allotment(10.0)).unwrap();
        let entry = &s.ledger[0];
        assert_eq!(entry.programmed_depth, 2500.0);
        assert_eq!(entry.delivered_depth, 2000.0);
        assert_eq!(entry.balance, 500.0);
        assert_eq!(entry.delivered_volume, 20_000.0);
    }

    #[test]
    fn zero_area_canal_is_rejected() {
        let p = Parcel::new("a", 1, 1, 1, 0.0);
        assert!(matches!(
            materialize_canal(&window(1.0), &[&p], &allotment(0.0)),
            Err(TurnError::ZeroArea { .. })
        ));
    }
}
