//! Network time lost to propagation, per canal.

use std::collections::BTreeMap;

use crate::aggregation::Hierarchy;
use crate::model::{CanalId, DeliveryPriority, ModeEntry, TransitTimes};

/// Travel time (minutes) for a canal's summed transit components.
///
/// Tail first: intake plus head-to-tail travel. Head first: tail-to-head travel.
pub fn travel_time(transit: &TransitTimes, priority: DeliveryPriority) -> f64 {
    match priority {
        DeliveryPriority::Tail => transit.toma + transit.cabeza_cola,
        DeliveryPriority::Head => transit.cola_cabeza,
    }
}

/// tpo_red = tpo_descuelgue - recorrido. Negative values are kept.
pub fn network_time(transit: &TransitTimes, priority: DeliveryPriority) -> f64 {
    transit.descuelgue - travel_time(transit, priority)
}

/// Network time of every canal, using the canal's own delivery priority.
/// Canals without a mode entry use the fallback priority.
pub fn resolve_network_times(
    hierarchy: &Hierarchy,
    modes: &BTreeMap<CanalId, ModeEntry>,
) -> BTreeMap<CanalId, f64> {
    hierarchy
        .canals
        .values()
        .map(|canal| {
            let priority = modes
                .get(&canal.canal)
                .unwrap_or(&ModeEntry::FALLBACK)
                .priority;
            let tpo_red = network_time(&canal.transit, priority);
            if tpo_red < 0.0 {
                tracing::warn!(
                    canal = canal.canal,
                    tpo_red,
                    "travel time exceeds drain-down time, net turn grows"
                );
            }
            (canal.canal, tpo_red)
        })
        .collect()
}
