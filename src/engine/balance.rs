//! Running platform balance.

use crate::domain::{Decimal, LedgerRow};

/// Signed effect of a row on the platform balance.
pub fn balance_delta(row: &LedgerRow) -> Decimal {
    if !row.moves_balance() {
        return Decimal::zero();
    }
    if row.is_deposit_activity() {
        row.total_usd
    } else if row.is_withdrawal_activity() {
        -row.total_usd
    } else {
        Decimal::zero()
    }
}

/// Sweep rows in timestamp order, snapshotting the balance after each one.
///
/// Ties keep their current relative order. Returns the closing balance.
pub fn apply_running_balance(rows: &mut [LedgerRow]) -> Decimal {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by_key(|&i| rows[i].timestamp);

    let mut balance = Decimal::zero();
    for i in order {
        let row = &mut rows[i];
        balance += balance_delta(row);
        row.account_balance_usd = Some(balance);
        row.account_balance_secondary = row.to_secondary(balance);
    }
    balance
}
