//! Irrigation turn scheduling.
//!
//! A turn hands the head flow of a channel to every enabled parcel of the
//! network, canal by canal, for a fixed duration. Given the parcel registry,
//! the season's irrigation requests, the per-canal mode matrix and optional
//! reinforcement sources and reservoirs, [`compute_turn`] derives one volume
//! per hectare for the whole network, a time window and flow for each canal,
//! and a cascading start/end for each parcel.
//!
//! Computation is stateless: the same snapshot and configuration always give
//! the same schedule.

mod aggregation;
mod error;
mod materialize;
mod model;
mod modes;
mod ordering;
mod report;
mod schema;
mod tables;
mod transit;
mod turn;
mod volume;

#[cfg(feature = "python")]
mod python;

pub use aggregation::{AreaTotals, CanalAggregate, GroupAggregate, Hierarchy, SubgroupAggregate};
pub use error::{Result, TurnError};
pub use materialize::{materialize_canal, Allotment, CanalSchedule, ScheduleEntry, WaterAccountEntry};
pub use model::{
    advance, hours_to_delta, parse_start, AreaAdjustments, CanalId, DeliveryPriority, GroupId, Level,
    ModeEntry, Parcel, ParcelId, PriorityPolarity, ReinforcementSource, ReservoirEntry, ScopeMode,
    Snapshot, SubgroupId, TimestampFormat, TransitTimes, TurnConfig, DEPTH_SCALE, FLOW_SCALE,
    TIME_SCALE,
};
pub use modes::{lookup_mode, resolve_windows, CanalWindow};
pub use ordering::order_parcels;
pub use report::{
    format_hours, round_to_tenth, turn_table_frame, DashboardRow, FlowRow, NetworkRow, ParcelRows,
    TurnReport, TurnRow, WaterAccountRow,
};
pub use tables::{read_json_table, snapshot_from_tables, InputTables};
pub use transit::{network_time, resolve_network_times, travel_time};
pub use turn::{compute_turn, compute_turn_from_tables, compute_turn_json, TurnOutcome, TurnRequest};
pub use volume::VolumeModel;

/// Column names of the input and output tables.
pub mod columns {
    pub use crate::schema::*;
}
