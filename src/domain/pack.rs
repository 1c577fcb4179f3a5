//! Pack purchases awaiting apportionment.

use crate::domain::{Decimal, MomentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A purchased pack. `moment_ids` is `None` until the pack contents are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackRecord {
    pub pack_id: String,
    pub purchased_at: DateTime<Utc>,
    pub cost_of_pack: Decimal,
    pub moment_ids: Option<Vec<MomentId>>,
}

impl PackRecord {
    pub fn new(pack_id: String, purchased_at: DateTime<Utc>, cost_of_pack: Decimal) -> Self {
        Self {
            pack_id,
            purchased_at,
            cost_of_pack,
            moment_ids: None,
        }
    }

    pub fn moment_count(&self) -> usize {
        self.moment_ids.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Even split of the pack cost; zero for free packs and for empty packs.
    pub fn cost_per_moment(&self) -> Decimal {
        let count = self.moment_count();
        if count == 0 || !self.cost_of_pack.is_positive() {
            return Decimal::zero();
        }
        self.cost_of_pack
            .checked_div(Decimal::from_i64(count as i64))
            .unwrap_or_else(Decimal::zero)
    }
}

/// Packs registered during matching, keyed by pack id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackRegistry {
    packs: BTreeMap<String, PackRecord>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pack; the first registration of an id wins.
    pub fn register(&mut self, record: PackRecord) {
        self.packs.entry(record.pack_id.clone()).or_insert(record);
    }

    pub fn get(&self, pack_id: &str) -> Option<&PackRecord> {
        self.packs.get(pack_id)
    }

    /// Record the resolved contents of a pack. Unknown pack ids are ignored.
    pub fn resolve(&mut self, pack_id: &str, moment_ids: Vec<MomentId>) -> bool {
        match self.packs.get_mut(pack_id) {
            Some(record) => {
                record.moment_ids = Some(moment_ids);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackRecord> {
        self.packs.values()
    }
}
