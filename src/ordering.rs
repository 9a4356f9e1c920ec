//! Delivery order of parcels within a canal.

use crate::model::{DeliveryPriority, Parcel};

/// Order a canal's parcels by their registry index: ascending when the head
/// is served first, descending when the tail is. The sort is stable, so
/// parcels sharing an index keep their relative order.
pub fn order_parcels<'a>(
    parcels: impl IntoIterator<Item = &'a Parcel>,
    priority: DeliveryPriority,
) -> Vec<&'a Parcel> {
    let mut ordered: Vec<&Parcel> = parcels.into_iter().collect();
    match priority {
        DeliveryPriority::Head => ordered.sort_by_key(|p| p.index),
        DeliveryPriority::Tail => ordered.sort_by_key(|p| std::cmp::Reverse(p.index)),
    }
    ordered
}
