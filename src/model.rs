use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnError};

pub type CanalId = i64;
pub type SubgroupId = i64;
pub type GroupId = i64;
pub type ParcelId = String;

/// Minutes per day. Transit times are recorded in minutes.
pub const TIME_SCALE: f64 = 1440.0;
/// Flow (l/s) × time → volume (m³), day-scaled: 86400 s / 1000 l.
pub const FLOW_SCALE: f64 = 86.4;
/// Volume per area → depth.
pub const DEPTH_SCALE: f64 = 10.0;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const LEGACY_FORMAT: &str = "Fecha:%d-%m-%Y Hora:%H:%M";

const DATETIME_INPUT_FORMATS: [&str; 8] = [
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const DATE_INPUT_FORMATS: [&str; 3] = ["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d"];

/// Hierarchy level, used to report where an aggregate went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Network,
    Group,
    Subgroup,
    Canal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Network => "network",
            Level::Group => "group",
            Level::Subgroup => "subgroup",
            Level::Canal => "canal",
        };
        f.write_str(name)
    }
}

// ── Mode matrix ─────────────────────────────────────────────────────────────

/// Which end of a canal is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPriority {
    Head,
    Tail,
}

impl DeliveryPriority {
    /// Parse a named priority (`cabeza`/`head`, `cola`/`tail`), case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        if crate::schema::priority::HEAD.contains(&label.as_str()) {
            Some(Self::Head)
        } else if crate::schema::priority::TAIL.contains(&label.as_str()) {
            Some(Self::Tail)
        } else {
            None
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Head => Self::Tail,
            Self::Tail => Self::Head,
        }
    }
}

/// Meaning of a numeric 0/1 delivery-priority flag.
///
/// Upstream systems have used both conventions, so numeric flags are only
/// accepted when the caller states which one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityPolarity {
    OneIsHead,
    OneIsTail,
}

impl PriorityPolarity {
    pub fn resolve(self, flag: i64) -> Option<DeliveryPriority> {
        let one = match self {
            Self::OneIsHead => DeliveryPriority::Head,
            Self::OneIsTail => DeliveryPriority::Tail,
        };
        match flag {
            1 => Some(one),
            0 => Some(one.flipped()),
            _ => None,
        }
    }
}

/// Contention policy at a hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    Sequential,
    Independent,
}

impl ScopeMode {
    /// 1 → sequential, 0 → independent.
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            1 => Some(Self::Sequential),
            0 => Some(Self::Independent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeEntry {
    pub priority: DeliveryPriority,
    pub subgroup_mode: ScopeMode,
    pub group_mode: ScopeMode,
}

impl ModeEntry {
    /// Applied to canals without a mode row: fully independent, head first.
    pub const FALLBACK: ModeEntry = ModeEntry {
        priority: DeliveryPriority::Head,
        subgroup_mode: ScopeMode::Independent,
        group_mode: ScopeMode::Independent,
    };

    pub fn new(priority: DeliveryPriority, group_mode: ScopeMode, subgroup_mode: ScopeMode) -> Self {
        Self {
            priority,
            subgroup_mode,
            group_mode,
        }
    }
}

// ── Parcels ─────────────────────────────────────────────────────────────────

/// Transit-time components of a parcel, in minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransitTimes {
    pub toma: f64,
    pub cabeza_cola: f64,
    pub cola_cabeza: f64,
    pub descuelgue: f64,
}

impl TransitTimes {
    pub fn accumulate(&mut self, other: &TransitTimes) {
        self.toma += other.toma;
        self.cabeza_cola += other.cabeza_cola;
        self.cola_cabeza += other.cola_cabeza;
        self.descuelgue += other.descuelgue;
    }
}

/// Area adjustments carried by an irrigation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaAdjustments {
    pub additional: f64,
    pub restricted: f64,
    pub received: f64,
    pub ceded: f64,
    pub active_factor: f64,
}

impl Default for AreaAdjustments {
    fn default() -> Self {
        Self {
            additional: 0.0,
            restricted: 0.0,
            received: 0.0,
            ceded: 0.0,
            active_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    pub id: ParcelId,
    /// Position in the registry; orders parcels within a canal.
    pub index: usize,
    pub canal: CanalId,
    pub subgroup: SubgroupId,
    pub group: GroupId,
    pub registered_area: f64,
    /// Enabled flag (ha sí/no) as a multiplicative factor.
    pub enabled: f64,
    pub adjustments: AreaAdjustments,
    pub transit: TransitTimes,
    pub cc: String,
    pub pp: String,
}

impl Parcel {
    pub fn new(
        id: impl Into<ParcelId>,
        canal: CanalId,
        subgroup: SubgroupId,
        group: GroupId,
        registered_area: f64,
    ) -> Self {
        Self {
            id: id.into(),
            index: 0,
            canal,
            subgroup,
            group,
            registered_area,
            enabled: 1.0,
            adjustments: AreaAdjustments::default(),
            transit: TransitTimes::default(),
            cc: String::new(),
            pp: String::new(),
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_adjustments(mut self, adjustments: AreaAdjustments) -> Self {
        self.adjustments = adjustments;
        self
    }

    pub fn with_transit(mut self, transit: TransitTimes) -> Self {
        self.transit = transit;
        self
    }

    pub fn with_codes(mut self, cc: impl Into<String>, pp: impl Into<String>) -> Self {
        self.cc = cc.into();
        self.pp = pp.into();
        self
    }

    /// sup_anexa = sup_ad - sup_res
    pub fn annexed_area(&self) -> f64 {
        self.adjustments.additional - self.adjustments.restricted
    }

    /// sup_pase = sup_rec - sup_ced
    pub fn transfer_area(&self) -> f64 {
        self.adjustments.received - self.adjustments.ceded
    }

    /// sup_riego = (sup_emp_reducida + sup_anexa + sup_pase) * ha_si * ha_activa
    pub fn irrigation_area(&self) -> f64 {
        (self.registered_area + self.annexed_area() + self.transfer_area())
            * self.enabled
            * self.adjustments.active_factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReinforcementSource {
    pub flow: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirEntry {
    pub volume: f64,
}

/// Immutable input of one scheduling request.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub parcels: Vec<Parcel>,
    pub modes: BTreeMap<CanalId, ModeEntry>,
    pub reinforcements: Vec<ReinforcementSource>,
    pub reservoirs: Vec<ReservoirEntry>,
}

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// `2022-01-01T06:00:00`
    #[default]
    Iso,
    /// `Fecha:01-01-2022 Hora:06:00`
    Legacy,
}

impl TimestampFormat {
    pub fn format(self, ts: NaiveDateTime) -> String {
        match self {
            Self::Iso => ts.format(ISO_FORMAT).to_string(),
            Self::Legacy => ts.format(LEGACY_FORMAT).to_string(),
        }
    }
}

/// Scalar configuration of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnConfig {
    /// Head flow of the channel (l/s).
    pub head_flow: f64,
    /// Turn duration in hours.
    pub turn_duration: f64,
    pub start: NaiveDateTime,
    pub simulate: bool,
    /// Programmed volume per hectare; drives the water account and, when
    /// simulating, the derived flows.
    pub programmed_volume_per_ha: f64,
    pub compensation_factor: f64,
    pub priority_polarity: Option<PriorityPolarity>,
    pub timestamp_format: TimestampFormat,
    pub show_volume: bool,
}

impl TurnConfig {
    pub fn new(head_flow: f64, turn_duration: f64, start: NaiveDateTime) -> Self {
        Self {
            head_flow,
            turn_duration,
            start,
            simulate: false,
            programmed_volume_per_ha: 0.0,
            compensation_factor: 1.0,
            priority_polarity: None,
            timestamp_format: TimestampFormat::Iso,
            show_volume: true,
        }
    }

    /// Derive flows from `programmed_volume_per_ha` instead of the computed entitlement.
    pub fn with_simulation(mut self, programmed_volume_per_ha: f64) -> Self {
        self.simulate = true;
        self.programmed_volume_per_ha = programmed_volume_per_ha;
        self
    }

    pub fn with_programmed_volume_per_ha(mut self, volume_per_ha: f64) -> Self {
        self.programmed_volume_per_ha = volume_per_ha;
        self
    }

    pub fn with_compensation_factor(mut self, factor: f64) -> Self {
        self.compensation_factor = factor;
        self
    }

    pub fn with_priority_polarity(mut self, polarity: PriorityPolarity) -> Self {
        self.priority_polarity = Some(polarity);
        self
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn with_show_volume(mut self, show_volume: bool) -> Self {
        self.show_volume = show_volume;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.turn_duration.is_finite() && self.turn_duration > 0.0) {
            return Err(TurnError::InvalidData(format!(
                "turn duration must be positive, got {}",
                self.turn_duration
            )));
        }
        if !self.head_flow.is_finite() {
            return Err(TurnError::InvalidData(format!(
                "head flow must be finite, got {}",
                self.head_flow
            )));
        }
        Ok(())
    }
}

/// Parse a start date, day first (`01-03-2022 06:30`) or ISO (`2022-03-01T06:30:00`).
/// A bare date starts at midnight.
pub fn parse_start(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in DATETIME_INPUT_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    for format in DATE_INPUT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date.and_time(chrono::NaiveTime::MIN));
        }
    }
    Err(TurnError::InvalidData(format!("unrecognized start date: '{raw}'")))
}

/// Convert fractional hours to a millisecond-resolution delta.
pub fn hours_to_delta(hours: f64) -> Result<TimeDelta> {
    let ms = (hours * 3_600_000.0).round();
    if !ms.is_finite() || ms.abs() > i64::MAX as f64 {
        return Err(TurnError::InvalidData(format!("duration out of range: {hours} h")));
    }
    TimeDelta::try_milliseconds(ms as i64)
        .ok_or_else(|| TurnError::InvalidData(format!("duration out of range: {hours} h")))
}

/// `start` moved forward by fractional hours; fails instead of overflowing the calendar.
pub fn advance(start: NaiveDateTime, hours: f64) -> Result<NaiveDateTime> {
    start
        .checked_add_signed(hours_to_delta(hours)?)
        .ok_or_else(|| TurnError::InvalidData(format!("{start} + {hours} h is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irrigation_area_folds_adjustments() {
        let parcel = Parcel::new("p1", 1, 1, 1, 10.0).with_adjustments(AreaAdjustments {
            additional: 3.0,
            restricted: 1.0,
            received: 2.0,
            ceded: 0.5,
            active_factor: 0.5,
        });
        assert_eq!(parcel.annexed_area(), 2.0);
        assert_eq!(parcel.transfer_area(), 1.5);
        assert_eq!(parcel.irrigation_area(), (10.0 + 2.0 + 1.5) * 0.5);
    }

    #[test]
    fn disabled_parcel_has_no_area() {
        let mut parcel = Parcel::new("p1", 1, 1, 1, 10.0);
        parcel.enabled = 0.0;
        assert_eq!(parcel.irrigation_area(), 0.0);
    }

    #[test]
    fn polarity_maps_both_conventions() {
        assert_eq!(PriorityPolarity::OneIsHead.resolve(1), Some(DeliveryPriority::Head));
        assert_eq!(PriorityPolarity::OneIsHead.resolve(0), Some(DeliveryPriority::Tail));
        assert_eq!(PriorityPolarity::OneIsTail.resolve(1), Some(DeliveryPriority::Tail));
        assert_eq!(PriorityPolarity::OneIsTail.resolve(0), Some(DeliveryPriority::Head));
        assert_eq!(PriorityPolarity::OneIsTail.resolve(2), None);
    }

    #[test]
    fn priority_labels() {
        assert_eq!(DeliveryPriority::from_label("Cabeza"), Some(DeliveryPriority::Head));
        assert_eq!(DeliveryPriority::from_label(" tail "), Some(DeliveryPriority::Tail));
        assert_eq!(DeliveryPriority::from_label("middle"), None);
    }

    #[test]
    fn parse_start_day_first_and_iso() {
        let expected = NaiveDate::from_ymd_opt(2022, 3, 1)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        assert_eq!(parse_start("01-03-2022 06:30").unwrap(), expected);
        assert_eq!(parse_start("2022-03-01T06:30:00").unwrap(), expected);
        assert_eq!(
            parse_start("01-03-2022").unwrap(),
            NaiveDate::from_ymd_opt(2022, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(parse_start("March 1st").is_err());
    }

    #[test]
    fn timestamp_formats() {
        let ts = NaiveDate::from_ymd_opt(2022, 1, 5)
            .unwrap()
            .and_hms_opt(18, 45, 10)
            .unwrap();
        assert_eq!(TimestampFormat::Iso.format(ts), "2022-01-05T18:45:10");
        assert_eq!(TimestampFormat::Legacy.format(ts), "Fecha:05-01-2022 Hora:18:45");
    }

    #[test]
    fn hours_to_delta_rounds_to_millis() {
        assert_eq!(hours_to_delta(1.5).unwrap(), TimeDelta::minutes(90));
        assert!(hours_to_delta(f64::INFINITY).is_err());
    }

    #[test]
    fn advance_past_the_calendar_is_an_error() {
        let start = parse_start("01-01-2022").unwrap();
        assert_eq!(advance(start, 2.0).unwrap(), start + TimeDelta::hours(2));
        assert!(matches!(advance(start, 1e10), Err(TurnError::InvalidData(_))));
    }

    #[test]
    fn config_rejects_non_positive_duration() {
        let start = parse_start("01-01-2022").unwrap();
        assert!(TurnConfig::new(100.0, 0.0, start).validate().is_err());
        assert!(TurnConfig::new(100.0, 24.0, start).validate().is_ok());
    }
}
