//! Sale profit and holding period.

use crate::domain::{ActivityKind, Decimal, LedgerRow, MatchSource, MomentId};
use crate::engine::anomaly::{Anomaly, AnomalyReport, RowContext};
use crate::engine::packs::PackCost;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

const DAY_MS: i64 = 86_400_000;

/// Whole days between two instants, any partial day counting as a full one.
pub fn days_held(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let ms = (to - from).num_milliseconds();
    -(-ms).div_euclid(DAY_MS)
}

/// Purchases from another collector, including accepted offers and
/// tracker-only purchases.
fn is_p2p_purchase(row: &LedgerRow) -> bool {
    if !row.is_succeeded() {
        return false;
    }
    match row.activity_details {
        Some(details) => details.is_p2p_purchase(),
        None => {
            row.match_source() == MatchSource::Secondary && row.activity_kind == ActivityKind::Purchase
        }
    }
}

/// Fill `sale_profit_*`, `days_held` and `from_pack_id` on every sale.
///
/// Pack-sourced moments take precedence over P2P purchases. A P2P sale is
/// paired with the most recent purchase of the same moment at or before it.
pub fn compute_profits(
    rows: &mut [LedgerRow],
    pack_costs: &HashMap<MomentId, PackCost>,
    anomalies: &mut AnomalyReport,
) {
    let purchases: Vec<(MomentId, DateTime<Utc>, Decimal)> = rows
        .iter()
        .filter(|r| is_p2p_purchase(r))
        .filter_map(|r| {
            r.item
                .moment_id
                .clone()
                .map(|id| (id, r.timestamp, r.subtotal_usd))
        })
        .collect();

    let mut resolved = 0usize;
    for row in rows.iter_mut() {
        if row.activity_kind != ActivityKind::Sale || !row.is_succeeded() || !row.is_matched() {
            continue;
        }
        let origin = row.item.moment_id.as_ref().and_then(|moment_id| {
            if let Some(pack) = pack_costs.get(moment_id) {
                return Some((
                    row.subtotal_usd - pack.cost_per_moment,
                    pack.purchased_at,
                    Some(pack.pack_id.clone()),
                ));
            }
            purchases
                .iter()
                .filter(|(id, at, _)| id == moment_id && *at <= row.timestamp)
                .max_by_key(|(_, at, _)| *at)
                .map(|(_, at, price)| (*price - row.total_usd, *at, None))
        });

        match origin {
            Some((profit, acquired_at, pack_id)) => {
                row.sale_profit_usd = Some(profit);
                row.sale_profit_secondary = row.to_secondary(profit);
                row.days_held = Some(days_held(acquired_at, row.timestamp));
                row.from_pack_id = pack_id;
                resolved += 1;
            }
            None => anomalies.push(Anomaly::UnresolvedSaleOrigin {
                row: RowContext::of(row),
            }),
        }
    }
    debug!("Resolved profit for {} sales", resolved);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityType, CurrencyCode, PaymentMethod, RowStatus};
    use chrono::{Duration, TimeZone};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn matched_row(
        id: u64,
        activity: &str,
        at: DateTime<Utc>,
        amount: &str,
        details: ActivityType,
        moment: &str,
    ) -> LedgerRow {
        let mut r = LedgerRow::new(
            activity.to_string(),
            at,
            RowStatus::Succeeded,
            PaymentMethod::DapperBalance,
            format!("pay-{}", id),
            dec(amount),
            Decimal::zero(),
            dec(amount),
        );
        r.id = id;
        r.bind_match(format!("act-{}", id), MatchSource::Primary).unwrap();
        r.activity_details = Some(details);
        r.item.moment_id = Some(MomentId::new(moment.to_string()));
        r
    }

    #[test]
    fn days_held_rounds_up() {
        let t0 = Utc.with_ymd_and_hms(2021, 3, 4, 9, 0, 0).unwrap();
        assert_eq!(days_held(t0, t0), 0);
        assert_eq!(days_held(t0, t0 + Duration::minutes(1)), 1);
        assert_eq!(days_held(t0, t0 + Duration::hours(14)), 1);
        assert_eq!(days_held(t0, t0 + Duration::days(1)), 1);
        assert_eq!(days_held(t0, t0 + Duration::days(1) + Duration::seconds(1)), 2);
    }

    #[test]
    fn pack_moment_profit_uses_apportioned_cost() {
        let bought = Utc.with_ymd_and_hms(2021, 2, 1, 18, 0, 0).unwrap();
        let sold = Utc.with_ymd_and_hms(2021, 2, 10, 6, 0, 0).unwrap();
        let mut rows = vec![matched_row(
            1,
            "NBA Top Shot sale",
            sold,
            "12",
            ActivityType::P2pMomentListingSold,
            "m-1",
        )];
        rows[0].set_rate(CurrencyCode::parse("AUD").unwrap(), dec("1.3"));
        let mut costs = HashMap::new();
        costs.insert(
            MomentId::new("m-1".to_string()),
            PackCost {
                pack_id: "p-1".to_string(),
                cost_per_moment: dec("5"),
                purchased_at: bought,
            },
        );
        let mut anomalies = AnomalyReport::new();
        compute_profits(&mut rows, &costs, &mut anomalies);
        assert_eq!(rows[0].sale_profit_usd, Some(dec("7")));
        assert_eq!(rows[0].sale_profit_secondary, Some(dec("9.10")));
        assert_eq!(rows[0].from_pack_id.as_deref(), Some("p-1"));
        assert_eq!(rows[0].days_held, Some(9));
        assert!(anomalies.is_empty());
    }

    #[test]
    fn p2p_profit_pairs_latest_prior_purchase() {
        let t = |d: u32| Utc.with_ymd_and_hms(2021, 3, d, 12, 0, 0).unwrap();
        let mut rows = vec![
            matched_row(1, "NBA Top Shot purchase", t(1), "10", ActivityType::PurchaseP2pMoment, "m-1"),
            matched_row(2, "NBA Top Shot purchase", t(3), "14", ActivityType::OfferAvailable, "m-1"),
            matched_row(3, "NBA Top Shot sale", t(5), "19", ActivityType::P2pMomentListingSold, "m-1"),
            matched_row(4, "NBA Top Shot purchase", t(9), "30", ActivityType::PurchaseP2pMoment, "m-1"),
        ];
        let mut anomalies = AnomalyReport::new();
        compute_profits(&mut rows, &HashMap::new(), &mut anomalies);
        assert_eq!(rows[2].sale_profit_usd, Some(dec("-5")));
        assert_eq!(rows[2].days_held, Some(2));
        assert_eq!(rows[2].from_pack_id, None);
        assert_eq!(rows[2].sale_profit_secondary, None);
    }

    #[test]
    fn sale_without_origin_is_flagged() {
        let t = Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();
        let mut rows = vec![matched_row(
            1,
            "NBA Top Shot sale",
            t,
            "19",
            ActivityType::P2pMomentListingSold,
            "m-reward",
        )];
        let mut anomalies = AnomalyReport::new();
        compute_profits(&mut rows, &HashMap::new(), &mut anomalies);
        assert_eq!(rows[0].sale_profit_usd, None);
        assert_eq!(anomalies.count("UnresolvedSaleOrigin"), 1);
    }
}
