//! Hierarchy aggregation: parcel areas folded up Canal → Subgroup → Group → network.
//!
//! All keyed maps are `BTreeMap`, so every walk over canals, subgroups or
//! groups happens in ascending identifier order and the schedules built on
//! top of them are reproducible.

use std::collections::BTreeMap;

use crate::error::{Result, TurnError};
use crate::model::{CanalId, GroupId, Level, Parcel, SubgroupId, TransitTimes};

/// Area sums of a set of parcels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AreaTotals {
    /// Σ sup_emp_reducida
    pub registered: f64,
    /// Σ sup_anexa
    pub annexed: f64,
    /// Σ sup_pase
    pub transfer: f64,
    /// Σ sup_riego
    pub irrigation: f64,
    pub parcels: usize,
}

impl AreaTotals {
    fn add_parcel(&mut self, parcel: &Parcel) {
        self.registered += parcel.registered_area;
        self.annexed += parcel.annexed_area();
        self.transfer += parcel.transfer_area();
        self.irrigation += parcel.irrigation_area();
        self.parcels += 1;
    }

    fn add(&mut self, other: &AreaTotals) {
        self.registered += other.registered;
        self.annexed += other.annexed;
        self.transfer += other.transfer;
        self.irrigation += other.irrigation;
        self.parcels += other.parcels;
    }

    /// Irrigation area net of annexed and transferred area.
    pub fn distribution_area(&self) -> f64 {
        self.irrigation - (self.annexed + self.transfer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanalAggregate {
    pub canal: CanalId,
    pub subgroup: SubgroupId,
    pub group: GroupId,
    pub area: AreaTotals,
    pub transit: TransitTimes,
    /// Positions of the member parcels in the snapshot, registry order.
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubgroupAggregate {
    pub subgroup: SubgroupId,
    pub group: GroupId,
    pub area: AreaTotals,
    pub canals: Vec<CanalId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregate {
    pub group: GroupId,
    pub area: AreaTotals,
    pub subgroups: Vec<SubgroupId>,
}

/// Aggregates of one snapshot. Built fresh per request, never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    pub canals: BTreeMap<CanalId, CanalAggregate>,
    pub subgroups: BTreeMap<SubgroupId, SubgroupAggregate>,
    pub groups: BTreeMap<GroupId, GroupAggregate>,
    pub total: AreaTotals,
}

impl Hierarchy {
    /// Sum parcels into canal, subgroup and group aggregates.
    ///
    /// Fails when a canal's parcels disagree on their subgroup or a
    /// subgroup's canals disagree on their group.
    pub fn aggregate(parcels: &[Parcel]) -> Result<Self> {
        let mut canals: BTreeMap<CanalId, CanalAggregate> = BTreeMap::new();
        for (position, parcel) in parcels.iter().enumerate() {
            let canal = canals
                .entry(parcel.canal)
                .or_insert_with(|| CanalAggregate {
                    canal: parcel.canal,
                    subgroup: parcel.subgroup,
                    group: parcel.group,
                    area: AreaTotals::default(),
                    transit: TransitTimes::default(),
                    members: Vec::new(),
                });
            if canal.subgroup != parcel.subgroup || canal.group != parcel.group {
                return Err(TurnError::InconsistentHierarchy(format!(
                    "parcel '{}' places canal {} in subgroup {}/group {}, \
                     earlier parcels in subgroup {}/group {}",
                    parcel.id,
                    parcel.canal,
                    parcel.subgroup,
                    parcel.group,
                    canal.subgroup,
                    canal.group
                )));
            }
            canal.area.add_parcel(parcel);
            canal.transit.accumulate(&parcel.transit);
            canal.members.push(position);
        }

        let mut subgroups: BTreeMap<SubgroupId, SubgroupAggregate> = BTreeMap::new();
        for canal in canals.values() {
            let subgroup = subgroups
                .entry(canal.subgroup)
                .or_insert_with(|| SubgroupAggregate {
                    subgroup: canal.subgroup,
                    group: canal.group,
                    area: AreaTotals::default(),
                    canals: Vec::new(),
                });
            if subgroup.group != canal.group {
                return Err(TurnError::InconsistentHierarchy(format!(
                    "subgroup {} spans groups {} and {}",
                    canal.subgroup, subgroup.group, canal.group
                )));
            }
            subgroup.area.add(&canal.area);
            subgroup.canals.push(canal.canal);
        }

        let mut groups: BTreeMap<GroupId, GroupAggregate> = BTreeMap::new();
        for subgroup in subgroups.values() {
            let group = groups
                .entry(subgroup.group)
                .or_insert_with(|| GroupAggregate {
                    group: subgroup.group,
                    area: AreaTotals::default(),
                    subgroups: Vec::new(),
                });
            group.area.add(&subgroup.area);
            group.subgroups.push(subgroup.subgroup);
        }

        let mut total = AreaTotals::default();
        for group in groups.values() {
            total.add(&group.area);
        }

        tracing::debug!(
            canals = canals.len(),
            subgroups = subgroups.len(),
            groups = groups.len(),
            irrigation_area = total.irrigation,
            "hierarchy aggregated"
        );

        Ok(Self {
            canals,
            subgroups,
            groups,
            total,
        })
    }

    pub fn total_area(&self) -> f64 {
        self.total.irrigation
    }

    /// Irrigation area of a canal; an unknown canal aggregates to zero.
    pub fn canal_area(&self, canal: CanalId) -> f64 {
        self.canals.get(&canal).map_or(0.0, |c| c.area.irrigation)
    }

    pub fn subgroup_area(&self, subgroup: SubgroupId) -> f64 {
        self.subgroups.get(&subgroup).map_or(0.0, |s| s.area.irrigation)
    }

    pub fn group_area(&self, group: GroupId) -> f64 {
        self.groups.get(&group).map_or(0.0, |g| g.area.irrigation)
    }

    /// Every aggregate that divides a volume or a duration must have positive area.
    pub fn ensure_positive_areas(&self) -> Result<()> {
        ensure_positive(Level::Network, "all", self.total.irrigation)?;
        for group in self.groups.values() {
            ensure_positive(Level::Group, group.group, group.area.irrigation)?;
        }
        for subgroup in self.subgroups.values() {
            ensure_positive(Level::Subgroup, subgroup.subgroup, subgroup.area.irrigation)?;
        }
        for canal in self.canals.values() {
            ensure_positive(Level::Canal, canal.canal, canal.area.irrigation)?;
        }
        Ok(())
    }
}

fn ensure_positive(level: Level, id: impl ToString, area: f64) -> Result<()> {
    if area.is_finite() && area > 0.0 {
        Ok(())
    } else {
        Err(TurnError::ZeroArea {
            level,
            id: id.to_string(),
        })
    }
}
