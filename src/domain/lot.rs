//! FIFO deposit lots and the realization record written onto withdrawals.

use crate::domain::Decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A slice of the platform balance attributed to one historical deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositLot {
    /// Ordinal in deposit order, starting at 0.
    pub lot_id: usize,
    pub usd_amount: Decimal,
    pub remaining_usd: Decimal,
    pub secondary_amount: Option<Decimal>,
    pub exchange_rate: Option<Decimal>,
    pub payment_id: String,
    pub deposit_date: DateTime<Utc>,
}

impl DepositLot {
    pub fn is_exhausted(&self) -> bool {
        !self.remaining_usd.is_positive()
    }

    /// Take up to `usd` from the lot and return what was actually taken.
    ///
    /// `remaining_usd` only ever decreases and never goes below zero.
    pub fn consume(&mut self, usd: Decimal) -> Decimal {
        if !usd.is_positive() || self.is_exhausted() {
            return Decimal::zero();
        }
        let taken = self.remaining_usd.min(usd);
        self.remaining_usd -= taken;
        taken
    }
}

/// Audit entry for one lot touched by a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotUsage {
    pub lot_id: usize,
    pub payment_id: String,
    pub deposit_date: DateTime<Utc>,
    pub usd_consumed: Decimal,
    /// Unrounded; only the realization total is rounded to cents.
    pub equivalent_cost: Decimal,
}

/// Realized forex gain on a withdrawal, with the lots it consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForexRealization {
    pub currency_withdrawal: Decimal,
    pub currency_equivalent_cost: Decimal,
    pub forex_gain: Decimal,
    pub lots_used: Vec<LotUsage>,
    pub withdrawal_date: DateTime<Utc>,
}

impl ForexRealization {
    pub fn deposits_used(&self) -> Vec<&str> {
        self.lots_used.iter().map(|u| u.payment_id.as_str()).collect()
    }
}
