//! Two-source activity matcher.
//!
//! Every succeeded, unmatched, non-ignorable row is offered first to the
//! marketplace feed and then to the secondary tracker, each through the
//! shrinking date window. Claimed ids, registered packs and queued token
//! lookups live in an explicit `MatchState` that is passed in and handed back.

use crate::domain::{
    brief_date, ActivityKind, ActivityType, Decimal, ExternalActivity, LedgerRow, MatchSource,
    PackRegistry, PaymentMethod, Role, SecondaryActivity, UserId,
};
use crate::engine::anomaly::{Anomaly, AnomalyReport, RowContext};
use crate::engine::packs::pack_records;
use crate::engine::projection::{enrich_from_secondary, project_primary, project_secondary};
use crate::engine::window::shrinking_match;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Platform fee taken from P2P and offer sales.
///
/// The export only ever shows the seller's net subtotal, so matching has to
/// gross it back up by `1 / (1 - rate)`. The historical rate is assumed
/// constant; this is unverified against older platform fee schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    rate: Decimal,
}

impl FeeSchedule {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    fn retained(&self) -> Decimal {
        Decimal::one() - self.rate
    }

    /// Net amount grossed up to the listed price, unrounded.
    pub fn gross_up(&self, net: Decimal) -> Decimal {
        net.checked_div(self.retained()).unwrap_or(net)
    }

    /// Fee the platform kept on a sale that paid out `total`, in cents.
    pub fn sale_fee(&self, total: Decimal) -> Decimal {
        (self.gross_up(total) - total).round2()
    }

    /// Price a row should match in the marketplace feed.
    pub fn primary_price(&self, row: &LedgerRow) -> Decimal {
        let grossed = row.is_offer()
            || (row.payment_method == PaymentMethod::DapperBalance
                && row.activity_kind == ActivityKind::Sale);
        if grossed {
            self.gross_up(row.subtotal_usd).round2()
        } else {
            row.subtotal_usd.round2()
        }
    }

    /// Price a row should match in the tracker feed. Only sales carry the fee.
    pub fn secondary_price(&self, row: &LedgerRow) -> Decimal {
        if row.activity_kind == ActivityKind::Sale {
            self.gross_up(row.subtotal_usd).round2()
        } else {
            row.subtotal_usd.round2()
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(Decimal::new(rust_decimal::Decimal::new(5, 2)))
    }
}

/// Tracker token id to resolve into a marketplace moment id after matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLookup {
    pub row_id: u64,
    pub token_id: String,
}

/// Accumulator threaded through the matching pass.
#[derive(Debug, Clone, Default)]
pub struct MatchState {
    pub claimed_primary: HashSet<String>,
    pub claimed_secondary: HashSet<String>,
    pub packs: PackRegistry,
    pub token_lookups: Vec<TokenLookup>,
    pub anomalies: AnomalyReport,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The caller's side of a trade recorded on `kind`.
pub fn caller_role(kind: ActivityKind) -> Role {
    if kind.is_sell_side() {
        Role::Seller
    } else {
        Role::Buyer
    }
}

/// Sales only pair with sale-side activity types and purchases with the rest.
fn direction_agrees(kind: ActivityKind, activity_type: ActivityType) -> bool {
    match kind {
        ActivityKind::Sale => activity_type.is_p2p_sale(),
        ActivityKind::Purchase | ActivityKind::PackPurchase => !activity_type.is_p2p_sale(),
        _ => true,
    }
}

pub struct ActivityMatcher<'a> {
    primary: &'a [ExternalActivity],
    secondary: &'a [SecondaryActivity],
    user: &'a UserId,
    fees: FeeSchedule,
}

impl<'a> ActivityMatcher<'a> {
    pub fn new(
        primary: &'a [ExternalActivity],
        secondary: &'a [SecondaryActivity],
        user: &'a UserId,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            primary,
            secondary,
            user,
            fees,
        }
    }

    /// Match all rows in order. Rows must already be in chronological order.
    pub fn run(&self, mut rows: Vec<LedgerRow>, mut state: MatchState) -> (Vec<LedgerRow>, MatchState) {
        for row in rows.iter_mut() {
            if !row.is_succeeded() || row.is_matched() || row.is_ignorable_for_matching() {
                continue;
            }
            self.match_row(row, &mut state);
        }
        debug!(
            "Matching done: {} primary, {} secondary claimed, {} packs",
            state.claimed_primary.len(),
            state.claimed_secondary.len(),
            state.packs.len()
        );
        (rows, state)
    }

    fn match_row(&self, row: &mut LedgerRow, state: &mut MatchState) {
        if self.try_primary(row, state) {
            return;
        }
        if self.try_secondary(row, state) {
            return;
        }
        state.anomalies.push(Anomaly::NoMatchFound {
            row: RowContext::of(row),
        });
    }

    fn try_primary(&self, row: &mut LedgerRow, state: &mut MatchState) -> bool {
        let price = self.fees.primary_price(row);
        let candidates: Vec<&ExternalActivity> = self
            .primary
            .iter()
            .filter(|a| {
                !a.activity_type.is_non_monetary()
                    && a.is_success()
                    && a.is_filled_offer()
                    && direction_agrees(row.activity_kind, a.activity_type)
                    && !state.claimed_primary.contains(&a.id)
                    && a.price().map(|p| p.round2()) == Some(price)
            })
            .collect();

        let found = shrinking_match(&candidates, &row.timestamp);
        let Some(activity) = found.first() else {
            return false;
        };
        if found.is_ambiguous() {
            state.anomalies.push(Anomaly::AmbiguousMatch {
                row: RowContext::of(row),
                chosen: activity.id.clone(),
                candidates: found.matches.iter().map(|a| a.id.clone()).collect(),
            });
        }
        state.claimed_primary.insert(activity.id.clone());
        if let Err(e) = row.bind_match(activity.id.clone(), MatchSource::Primary) {
            warn!("{}", e);
            return true;
        }

        row.activity_details = Some(activity.activity_type);
        row.item = project_primary(activity);
        if activity.activity_type.is_pack() {
            row.activity_kind = ActivityKind::PackPurchase;
            for record in pack_records(activity) {
                state.packs.register(record);
            }
        } else {
            self.enrich_primary(row, activity, state);
        }

        row.sale_fee_usd = Some(
            if row.activity_kind == ActivityKind::Sale && activity.activity_type.is_p2p_sale() {
                self.fees.sale_fee(row.total_usd)
            } else {
                Decimal::zero()
            },
        );
        debug!(
            "Row {} matched {} {} at prefix {}",
            row.id, activity.activity_type, activity.id, found.level
        );
        true
    }

    /// Pull team, token and counterparty from the tracker's record of the same trade.
    fn enrich_primary(&self, row: &mut LedgerRow, activity: &ExternalActivity, state: &mut MatchState) {
        let Some(serial) = row.item.serial_number else {
            return;
        };
        let role = caller_role(row.activity_kind);
        let day = brief_date(&activity.created_at);
        let hit = self.secondary.iter().find(|sale| {
            !state.claimed_secondary.contains(&sale.key)
                && sale.serial_number == serial
                && brief_date(&sale.block_timestamp) == day
                && sale.has_role(role, self.user)
                && sale
                    .moment
                    .as_ref()
                    .and_then(|m| m.play_id.as_ref())
                    .map(|play| row.item.moment_play_id.as_ref() == Some(play))
                    .unwrap_or(true)
        });
        if let Some(sale) = hit {
            state.claimed_secondary.insert(sale.key.clone());
            enrich_from_secondary(&mut row.item, sale, role);
        }
    }

    fn try_secondary(&self, row: &mut LedgerRow, state: &mut MatchState) -> bool {
        let role = caller_role(row.activity_kind);
        let price = self.fees.secondary_price(row);
        let candidates: Vec<&SecondaryActivity> = self
            .secondary
            .iter()
            .filter(|sale| {
                !state.claimed_secondary.contains(&sale.key)
                    && sale.has_role(role, self.user)
                    && sale.price.round2() == price
            })
            .collect();

        let found = shrinking_match(&candidates, &row.timestamp);
        let Some(sale) = found.first() else {
            return false;
        };
        if found.is_ambiguous() {
            state.anomalies.push(Anomaly::AmbiguousMatch {
                row: RowContext::of(row),
                chosen: sale.key.clone(),
                candidates: found.matches.iter().map(|s| s.key.clone()).collect(),
            });
        }
        state.claimed_secondary.insert(sale.key.clone());
        if let Err(e) = row.bind_match(sale.key.clone(), MatchSource::Secondary) {
            warn!("{}", e);
            return true;
        }

        row.item = project_secondary(sale, role);
        row.sale_fee_usd = Some(if row.activity_kind == ActivityKind::Sale {
            self.fees.sale_fee(row.total_usd)
        } else {
            Decimal::zero()
        });
        if let Some(token_id) = &sale.token_id {
            state.token_lookups.push(TokenLookup {
                row_id: row.id,
                token_id: token_id.clone(),
            });
        }
        debug!("Row {} matched tracker sale {} at prefix {}", row.id, sale.key, found.level);
        true
    }
}
