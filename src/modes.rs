//! Mode-resolution scheduler.
//!
//! Each canal's (group mode, subgroup mode) pair decides how much of the
//! turn it receives and when its window opens:
//!
//! | group       | subgroup    | duration            | start                                   |
//! |-------------|-------------|---------------------|-----------------------------------------|
//! | sequential  | sequential  | `f_g * f_sg * T`    | end of the previous canal               |
//! | sequential  | independent | `f_g * T`           | subgroup start, subgroups serialized    |
//! | independent | sequential  | `f_sg * T`          | end of previous canal in same subgroup  |
//! | independent | independent | `T`                 | turn start                              |
//!
//! `f_g` is the subgroup's share of the network and `f_sg` the canal's share
//! of its subgroup. Canals are walked in ascending canal order.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::aggregation::{CanalAggregate, Hierarchy};
use crate::error::{Result, TurnError};
use crate::model::{advance, CanalId, GroupId, ModeEntry, ScopeMode, SubgroupId};

/// Allotted time window of one canal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanalWindow {
    pub canal: CanalId,
    pub subgroup: SubgroupId,
    pub group: GroupId,
    pub mode: ModeEntry,
    /// Scheduled with [`ModeEntry::FALLBACK`] because the canal had no mode row.
    pub fallback: bool,
    /// Hours.
    pub duration: f64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

pub fn lookup_mode(modes: &BTreeMap<CanalId, ModeEntry>, canal: CanalId) -> Result<ModeEntry> {
    modes
        .get(&canal)
        .copied()
        .ok_or(TurnError::InvalidMode { canal })
}

/// Resolve the window of every canal of the hierarchy.
///
/// Areas must already be checked positive.
pub fn resolve_windows(
    hierarchy: &Hierarchy,
    modes: &BTreeMap<CanalId, ModeEntry>,
    turn_duration: f64,
    start: NaiveDateTime,
) -> Result<Vec<CanalWindow>> {
    let total_area = hierarchy.total_area();
    let mut cursors = Cursors::new(start);
    let mut windows = Vec::with_capacity(hierarchy.canals.len());

    for canal in hierarchy.canals.values() {
        let (mode, fallback) = match lookup_mode(modes, canal.canal) {
            Ok(mode) => (mode, false),
            Err(err) => {
                tracing::warn!("{err}; scheduling as independent/independent");
                (ModeEntry::FALLBACK, true)
            }
        };

        let subgroup_area = hierarchy.subgroup_area(canal.subgroup);
        let f_g = subgroup_area / total_area;
        let f_sg = canal.area.irrigation / subgroup_area;

        let (duration, start) = match (mode.group_mode, mode.subgroup_mode) {
            (ScopeMode::Sequential, ScopeMode::Sequential) => {
                let duration = f_g * f_sg * turn_duration;
                (duration, cursors.previous_canal_end)
            }
            (ScopeMode::Sequential, ScopeMode::Independent) => {
                let duration = f_g * turn_duration;
                let start = cursors.serialized_subgroup_start(canal.subgroup, duration)?;
                (duration, start)
            }
            (ScopeMode::Independent, ScopeMode::Sequential) => {
                let duration = f_sg * turn_duration;
                let start = cursors.next_in_subgroup_scope(canal.subgroup, duration)?;
                (duration, start)
            }
            (ScopeMode::Independent, ScopeMode::Independent) => (turn_duration, cursors.global_start),
        };

        let window = make_window(canal, mode, fallback, duration, start)?;
        tracing::debug!(
            canal = window.canal,
            subgroup = window.subgroup,
            duration = window.duration,
            start = %window.start,
            "canal window resolved"
        );
        cursors.previous_canal_end = window.end;
        windows.push(window);
    }

    Ok(windows)
}

fn make_window(
    canal: &CanalAggregate,
    mode: ModeEntry,
    fallback: bool,
    duration: f64,
    start: NaiveDateTime,
) -> Result<CanalWindow> {
    Ok(CanalWindow {
        canal: canal.canal,
        subgroup: canal.subgroup,
        group: canal.group,
        mode,
        fallback,
        duration,
        start,
        end: advance(start, duration)?,
    })
}

/// Open sequential subgroup scope under an independent group.
#[derive(Debug, Clone, Copy)]
struct SubgroupScope {
    subgroup: SubgroupId,
    /// End of the last canal scheduled in this scope.
    cursor: NaiveDateTime,
}

#[derive(Debug)]
struct Cursors {
    global_start: NaiveDateTime,
    previous_canal_end: NaiveDateTime,
    /// Where the next serialized subgroup opens.
    next_subgroup_start: NaiveDateTime,
    subgroup_starts: BTreeMap<SubgroupId, NaiveDateTime>,
    scope: Option<SubgroupScope>,
    /// Cursors of scopes left earlier, resumed if their subgroup comes back.
    closed_scopes: BTreeMap<SubgroupId, NaiveDateTime>,
}

impl Cursors {
    fn new(start: NaiveDateTime) -> Self {
        Self {
            global_start: start,
            previous_canal_end: start,
            next_subgroup_start: start,
            subgroup_starts: BTreeMap::new(),
            scope: None,
            closed_scopes: BTreeMap::new(),
        }
    }

    /// Start of a subgroup that shares the turn with its sibling subgroups.
    /// The first canal of a subgroup opens its window and pushes the next
    /// subgroup back by `duration`.
    fn serialized_subgroup_start(
        &mut self,
        subgroup: SubgroupId,
        duration: f64,
    ) -> Result<NaiveDateTime> {
        if let Some(start) = self.subgroup_starts.get(&subgroup) {
            return Ok(*start);
        }
        let start = self.next_subgroup_start;
        self.next_subgroup_start = advance(start, duration)?;
        self.subgroup_starts.insert(subgroup, start);
        Ok(start)
    }

    /// Next slot in the subgroup's own time-division chain.
    fn next_in_subgroup_scope(
        &mut self,
        subgroup: SubgroupId,
        duration: f64,
    ) -> Result<NaiveDateTime> {
        let in_scope = matches!(&self.scope, Some(scope) if scope.subgroup == subgroup);
        if !in_scope {
            if let Some(left) = self.scope.take() {
                self.closed_scopes.insert(left.subgroup, left.cursor);
            }
            let cursor = self
                .closed_scopes
                .remove(&subgroup)
                .unwrap_or(self.global_start);
            tracing::debug!(subgroup, %cursor, "entering sequential subgroup scope");
            self.scope = Some(SubgroupScope { subgroup, cursor });
        }

        let scope = self.scope.get_or_insert(SubgroupScope {
            subgroup,
            cursor: self.global_start,
        });
        let start = scope.cursor;
        scope.cursor = advance(start, duration)?;
        Ok(start)
    }
}
