//! Pack registration and per-moment cost apportionment.

use crate::domain::{
    ActivityType, Decimal, ExternalActivity, MomentId, PackRecord, PackRegistry, Subject,
};
use crate::engine::anomaly::{Anomaly, AnomalyReport};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Records for every pack in a matched pack order.
///
/// Ticket-exchange packs cost nothing; otherwise each pack costs the listing
/// price, falling back to the order price split across the packs.
pub fn pack_records(activity: &ExternalActivity) -> Vec<PackRecord> {
    let Subject::PackOrder {
        price,
        listing_price,
        packs,
        ..
    } = &activity.subject
    else {
        return Vec::new();
    };
    let cost = if activity.activity_type == ActivityType::PurchasePackWithTickets {
        Decimal::zero()
    } else {
        listing_price.unwrap_or_else(|| {
            price
                .checked_div(Decimal::from_i64(packs.len().max(1) as i64))
                .unwrap_or(*price)
        })
    };
    packs
        .iter()
        .map(|pack| {
            let mut record = PackRecord::new(pack.id.clone(), activity.created_at, cost);
            if !pack.moment_ids.is_empty() {
                record.moment_ids = Some(pack.moment_ids.clone());
            }
            record
        })
        .collect()
}

/// Where a pack-sourced moment came from and what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackCost {
    pub pack_id: String,
    pub cost_per_moment: Decimal,
    pub purchased_at: DateTime<Utc>,
}

/// Map every resolved moment to its share of the pack cost.
///
/// Packs with no known moments cannot be apportioned and are reported for
/// manual reconciliation.
pub fn apportion(registry: &PackRegistry, anomalies: &mut AnomalyReport) -> HashMap<MomentId, PackCost> {
    let mut costs = HashMap::new();
    for pack in registry.iter() {
        if pack.moment_count() == 0 {
            anomalies.push(Anomaly::PackWithoutMoments {
                pack_id: pack.pack_id.clone(),
            });
            continue;
        }
        let cost = PackCost {
            pack_id: pack.pack_id.clone(),
            cost_per_moment: pack.cost_per_moment(),
            purchased_at: pack.purchased_at,
        };
        for moment_id in pack.moment_ids.iter().flatten() {
            costs.entry(moment_id.clone()).or_insert_with(|| cost.clone());
        }
    }
    costs
}
