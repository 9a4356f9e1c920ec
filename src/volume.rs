//! Volume and flow entitlement of a turn.
//!
//! One volume per hectare is derived for the whole network and applied
//! uniformly at every level: `volume(level) = area(level) * volume_per_ha`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregation::Hierarchy;
use crate::error::{Result, TurnError};
use crate::model::{
    CanalId, Level, ReinforcementSource, ReservoirEntry, TurnConfig, FLOW_SCALE, TIME_SCALE,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeModel {
    pub total_area: f64,
    /// Σ tpo_red over all canals, minutes.
    pub network_time: f64,
    /// turn duration - Σ tpo_red / 1440
    pub net_turn: f64,
    /// Head flow per hectare.
    pub unit_flow: f64,
    pub base_volume_per_ha: f64,
    pub reinforcement_capacity: f64,
    pub reservoir_volume: f64,
    pub volume_per_ha: f64,
    pub time_per_ha: f64,
}

impl VolumeModel {
    // TODO: network_time is summed over every canal even where a narrower
    // group/subgroup duration is derived from it; confirm with the irrigation
    // authority whether nested scopes should deduct only their own canals.
    pub fn build(
        hierarchy: &Hierarchy,
        network_times: &BTreeMap<CanalId, f64>,
        reinforcements: &[ReinforcementSource],
        reservoirs: &[ReservoirEntry],
        config: &TurnConfig,
    ) -> Result<Self> {
        let total_area = hierarchy.total_area();
        if !(total_area.is_finite() && total_area > 0.0) {
            return Err(TurnError::ZeroArea {
                level: Level::Network,
                id: "all".to_string(),
            });
        }

        let network_time: f64 = network_times.values().sum();
        let net_turn = config.turn_duration - network_time / TIME_SCALE;
        let unit_flow = config.head_flow / total_area;
        let base_volume_per_ha = unit_flow * net_turn * FLOW_SCALE;
        let reinforcement_capacity = reinforcement_capacity(reinforcements);
        let reservoir_volume = reservoir_volume(reservoirs);
        let volume_per_ha = base_volume_per_ha * config.compensation_factor
            + (reinforcement_capacity + reservoir_volume) / total_area;

        let model = Self {
            total_area,
            network_time,
            net_turn,
            unit_flow,
            base_volume_per_ha,
            reinforcement_capacity,
            reservoir_volume,
            volume_per_ha,
            time_per_ha: net_turn / total_area,
        };
        tracing::debug!(
            volume_per_ha = model.volume_per_ha,
            base_volume_per_ha = model.base_volume_per_ha,
            net_turn = model.net_turn,
            "volume model"
        );
        Ok(model)
    }

    pub fn volume(&self, area: f64) -> f64 {
        area * self.volume_per_ha
    }

    /// Flow a canal must carry to deliver its allotment in `duration` hours.
    ///
    /// When simulating, the programmed volume per hectare replaces the
    /// computed entitlement; area and duration are untouched.
    pub fn canal_flow(&self, area: f64, duration: f64, config: &TurnConfig) -> f64 {
        let volume_per_ha = if config.simulate {
            config.programmed_volume_per_ha
        } else {
            self.volume_per_ha
        };
        flow(area * volume_per_ha, duration)
    }
}

/// Σ(flow_i * duration_i) * 86.4
pub fn reinforcement_capacity(sources: &[ReinforcementSource]) -> f64 {
    sources.iter().map(|s| s.flow * s.duration).sum::<f64>() * FLOW_SCALE
}

pub fn reservoir_volume(reservoirs: &[ReservoirEntry]) -> f64 {
    reservoirs.iter().map(|r| r.volume).sum()
}

/// volume / duration / 86.4; zero when the duration is zero.
pub fn flow(volume: f64, duration: f64) -> f64 {
    if duration == 0.0 {
        0.0
    } else {
        volume / duration / FLOW_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_start, Parcel};

    fn config() -> TurnConfig {
        TurnConfig::new(100.0, 24.0, parse_start("01-01-2022").unwrap())
    }

    fn two_canals() -> Hierarchy {
        Hierarchy::aggregate(&[
            Parcel::new("a", 1, 1, 1, 50.0),
            Parcel::new("b", 2, 1, 1, 50.0),
        ])
        .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn base_formula_without_reinforcement_or_reservoir() {
        let h = two_canals();
        let model = VolumeModel::build(&h, &BTreeMap::new(), &[], &[], &config()).unwrap();
        assert!(close(model.base_volume_per_ha, 2073.6));
        assert_eq!(model.volume_per_ha, model.base_volume_per_ha);
        assert!(close(model.volume(50.0), 103_680.0));
        assert!(close(model.time_per_ha, 0.24));
    }

    #[test]
    fn network_time_reduces_net_turn() {
        let h = two_canals();
        let times = BTreeMap::from([(1, 720.0), (2, 720.0)]);
        let model = VolumeModel::build(&h, &times, &[], &[], &config()).unwrap();
        assert!(close(model.net_turn, 23.0));
        assert!(close(model.base_volume_per_ha, 23.0 * 86.4));
    }

    #[test]
    fn reinforcement_and_reservoir_spread_over_network() {
        let h = two_canals();
        let reinforcements = [
            ReinforcementSource {
                flow: 10.0,
                duration: 2.0,
            },
            ReinforcementSource {
                flow: 5.0,
                duration: 4.0,
            },
        ];
        let reservoirs = [ReservoirEntry { volume: 1000.0 }];
        let model = VolumeModel::build(
            &h,
            &BTreeMap::new(),
            &reinforcements,
            &reservoirs,
            &config().with_compensation_factor(0.9),
        )
        .unwrap();
        assert!(close(model.reinforcement_capacity, 40.0 * 86.4));
        assert_eq!(model.reservoir_volume, 1000.0);
        assert!(close(
            model.volume_per_ha,
            2073.6 * 0.9 + (40.0 * 86.4 + 1000.0) / 100.0
        ));
    }

    #[test]
    fn canal_flow_recovers_share_of_head_flow() {
        let h = two_canals();
        let model = VolumeModel::build(&h, &BTreeMap::new(), &[], &[], &config()).unwrap();
        assert!(close(model.canal_flow(50.0, 24.0, &config()), 50.0));
    }

    #[test]
    fn simulation_substitutes_programmed_volume() {
        let h = two_canals();
        let model = VolumeModel::build(&h, &BTreeMap::new(), &[], &[], &config()).unwrap();
        let simulated = config().with_simulation(864.0);
        assert!(close(model.canal_flow(50.0, 24.0, &simulated), 864.0 * 50.0 / 24.0 / 86.4));
        assert_eq!(model.volume_per_ha, model.base_volume_per_ha);
    }

    #[test]
    fn zero_network_area_fails() {
        let mut p = Parcel::new("a", 1, 1, 1, 50.0);
        p.enabled = 0.0;
        let h = Hierarchy::aggregate(&[p]).unwrap();
        assert!(matches!(
            VolumeModel::build(&h, &BTreeMap::new(), &[], &[], &config()),
            Err(TurnError::ZeroArea { .. })
        ));
    }
}
