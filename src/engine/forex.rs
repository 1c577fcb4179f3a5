//! FIFO foreign-exchange realization over the platform balance.
//!
//! The balance is treated as a USD-denominated account held by someone who
//! reports in another currency. Each deposit opens a lot at that day's rate;
//! each withdrawal consumes lots strictly in deposit order, and the gain is
//! the withdrawal's value at today's rate minus the historical cost of the
//! USD it used.

use crate::domain::{Decimal, DepositLot, ForexRealization, LedgerRow, LotUsage};
use crate::engine::anomaly::{Anomaly, AnomalyReport, RowContext};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForexError {
    #[error("deposit history covers only part of the withdrawal; {uncovered} USD left")]
    InsufficientDepositHistory {
        consumed: Vec<(usize, Decimal)>,
        uncovered: Decimal,
    },
}

/// Ordered deposit lots for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotLedger {
    lots: Vec<DepositLot>,
}

impl LotLedger {
    /// One lot per succeeded, positive deposit, however it was paid, in timestamp order.
    pub fn from_rows(rows: &[LedgerRow]) -> Self {
        let mut deposits: Vec<&LedgerRow> = rows
            .iter()
            .filter(|r| r.is_deposit_activity() && r.is_succeeded() && r.total_usd.is_positive())
            .collect();
        deposits.sort_by_key(|r| r.timestamp);

        let lots = deposits
            .into_iter()
            .enumerate()
            .map(|(lot_id, row)| DepositLot {
                lot_id,
                usd_amount: row.total_usd,
                remaining_usd: row.total_usd,
                secondary_amount: row.total_secondary(),
                exchange_rate: row.secondary_currency_rate,
                payment_id: row.payment_id.clone(),
                deposit_date: row.timestamp,
            })
            .collect();
        Self { lots }
    }

    pub fn lots(&self) -> &[DepositLot] {
        &self.lots
    }

    pub fn first_deposit_date(&self) -> Option<DateTime<Utc>> {
        self.lots.first().map(|l| l.deposit_date)
    }

    /// Total USD still held across all lots.
    pub fn remaining(&self) -> Decimal {
        self.lots.iter().map(|l| l.remaining_usd).sum()
    }

    /// Consume `usd` from the oldest lots first.
    ///
    /// Returns `(lot_id, usd_taken)` per lot touched. When the lots run dry
    /// every remaining lot is still drained and the shortfall is reported.
    pub fn withdraw(&mut self, usd: Decimal) -> Result<Vec<(usize, Decimal)>, ForexError> {
        let mut outstanding = usd;
        let mut consumed = Vec::new();
        for lot in self.lots.iter_mut().filter(|l| !l.is_exhausted()) {
            if !outstanding.is_positive() {
                break;
            }
            let taken = lot.consume(outstanding);
            outstanding -= taken;
            consumed.push((lot.lot_id, taken));
        }
        if outstanding.is_positive() {
            return Err(ForexError::InsufficientDepositHistory {
                consumed,
                uncovered: outstanding,
            });
        }
        Ok(consumed)
    }

    fn lot(&self, lot_id: usize) -> Option<&DepositLot> {
        self.lots.get(lot_id)
    }
}

/// Build the realization record, or `None` if any rate involved is unknown.
fn realize(ledger: &LotLedger, row: &LedgerRow, consumed: &[(usize, Decimal)]) -> Option<ForexRealization> {
    let rate = row.secondary_currency_rate?;
    let mut lots_used = Vec::with_capacity(consumed.len());
    for (lot_id, usd) in consumed {
        let lot = ledger.lot(*lot_id)?;
        let lot_rate = lot.exchange_rate?;
        lots_used.push(LotUsage {
            lot_id: *lot_id,
            payment_id: lot.payment_id.clone(),
            deposit_date: lot.deposit_date,
            usd_consumed: *usd,
            equivalent_cost: *usd * lot_rate,
        });
    }
    let currency_withdrawal = (row.total_usd * rate).round2();
    let currency_equivalent_cost = lots_used
        .iter()
        .map(|u| u.equivalent_cost)
        .sum::<Decimal>()
        .round2();
    Some(ForexRealization {
        currency_withdrawal,
        currency_equivalent_cost,
        forex_gain: currency_withdrawal - currency_equivalent_cost,
        lots_used,
        withdrawal_date: row.timestamp,
    })
}

/// Attach a `ForexRealization` to every covered withdrawal and return the lots.
pub fn apply_forex(rows: &mut [LedgerRow], anomalies: &mut AnomalyReport) -> LotLedger {
    let mut ledger = LotLedger::from_rows(rows);
    let Some(first_deposit) = ledger.first_deposit_date() else {
        info!("No deposits found; skipping forex realization");
        return ledger;
    };

    let mut order: Vec<usize> = (0..rows.len())
        .filter(|&i| {
            let r = &rows[i];
            r.is_withdrawal_activity() && r.is_succeeded() && r.total_usd.is_positive()
        })
        .collect();
    order.sort_by_key(|&i| rows[i].timestamp);

    let mut realized = 0usize;
    for i in order {
        let row = &mut rows[i];
        if row.timestamp < first_deposit {
            debug!("Withdrawal {} predates first deposit; left as is", row.payment_id);
            continue;
        }
        match ledger.withdraw(row.total_usd) {
            Ok(consumed) => match realize(&ledger, row, &consumed) {
                Some(realization) => {
                    row.forex_realization = Some(realization);
                    realized += 1;
                }
                None => warn!(
                    "Missing exchange rate for withdrawal {} on {}; lots consumed without realization",
                    row.payment_id, row.timestamp
                ),
            },
            Err(ForexError::InsufficientDepositHistory { uncovered, .. }) => {
                anomalies.push(Anomaly::InsufficientDepositHistory {
                    row: RowContext::of(row),
                    uncovered_usd: uncovered.to_canonical_string(),
                });
            }
        }
    }
    info!(
        "Forex realized on {} withdrawals across {} lots",
        realized,
        ledger.lots().len()
    );
    ledger
}
