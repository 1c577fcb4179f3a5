//! Zero-value rows for gifts and trade-ins, which the export never contains.

use crate::domain::{
    ActivityKind, ActivityType, Decimal, ExternalActivity, LedgerRow, MatchSource, PaymentMethod,
    RowStatus, Subject,
};
use crate::engine::projection::project_primary;
use std::collections::HashSet;
use tracing::{debug, warn};

const SALE_NAME: &str = "NBA Top Shot sale";
const PURCHASE_NAME: &str = "NBA Top Shot purchase";

fn shape(activity_type: ActivityType) -> Option<(ActivityKind, &'static str, PaymentMethod)> {
    match activity_type {
        ActivityType::MomentTransferRequest => {
            Some((ActivityKind::GiftSent, SALE_NAME, PaymentMethod::Gift))
        }
        ActivityType::MomentTransferReceived => {
            Some((ActivityKind::GiftReceived, PURCHASE_NAME, PaymentMethod::Gift))
        }
        ActivityType::MomentTradeInRequest | ActivityType::MomentsTradeInRequest => {
            Some((ActivityKind::TradeIn, SALE_NAME, PaymentMethod::TradeIn))
        }
        _ => None,
    }
}

fn zero_row(activity: &ExternalActivity, kind: ActivityKind, name: &str, method: PaymentMethod) -> LedgerRow {
    let mut row = LedgerRow::new(
        name.to_string(),
        activity.created_at,
        RowStatus::Succeeded,
        method,
        String::new(),
        Decimal::zero(),
        Decimal::zero(),
        Decimal::zero(),
    );
    row.activity_kind = kind;
    row.activity_details = Some(activity.activity_type);
    row.sale_fee_usd = Some(Decimal::zero());
    row
}

/// Synthesize rows for every gift and trade-in not already in `existing`.
///
/// New rows get ids counting up from `next_id`. A batch trade-in yields one
/// row per moment, bound to `<activity id>/<moment id>`.
pub fn synthesize(activities: &[ExternalActivity], existing: &[LedgerRow], next_id: u64) -> Vec<LedgerRow> {
    let represented: HashSet<&str> = existing
        .iter()
        .filter_map(|r| r.matched_activity_id())
        .collect();

    let mut out = Vec::new();
    for activity in activities.iter().filter(|a| a.is_success()) {
        let Some((kind, name, method)) = shape(activity.activity_type) else {
            continue;
        };

        let mut rows = match &activity.subject {
            Subject::TradeInBatch { moment_ids, .. } => moment_ids
                .iter()
                .map(|moment_id| {
                    let mut row = zero_row(activity, kind, name, method.clone());
                    row.item = project_primary(activity);
                    row.item.moment_id = Some(moment_id.clone());
                    (format!("{}/{}", activity.id, moment_id), row)
                })
                .collect::<Vec<_>>(),
            subject => {
                let mut row = zero_row(activity, kind, name, method);
                row.item = project_primary(activity);
                if let Subject::Transfer { counterparty, .. } = subject {
                    row.item.counterparty_id = counterparty.clone();
                }
                vec![(activity.id.clone(), row)]
            }
        };

        for (binding, mut row) in rows.drain(..) {
            if represented.contains(binding.as_str()) {
                continue;
            }
            row.id = next_id + out.len() as u64;
            if let Err(e) = row.bind_match(binding, MatchSource::Primary) {
                warn!("{}", e);
                continue;
            }
            out.push(row);
        }
    }
    debug!("Synthesized {} gift and trade-in rows", out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedStatus, MomentDetails, MomentId, UserId};
    use chrono::{TimeZone, Utc};

    fn moment(id: &str) -> MomentDetails {
        MomentDetails {
            id: MomentId::new(id.to_string()),
            play_id: "play-1".to_string(),
            player_name: "Luka Doncic".to_string(),
            play_category: "Handles".to_string(),
            set_id: "set-1".to_string(),
            set_visual_id: None,
            serial_number: Some(3),
            tier: None,
        }
    }

    fn activity(id: &str, activity_type: ActivityType, subject: Subject) -> ExternalActivity {
        let ts = Utc.with_ymd_and_hms(2021, 4, 1, 8, 0, 0).unwrap();
        ExternalActivity {
            id: id.to_string(),
            activity_type,
            status: FeedStatus::Success,
            created_at: ts,
            updated_at: ts,
            subject,
        }
    }

    fn feed() -> Vec<ExternalActivity> {
        vec![
            activity(
                "gift-out",
                ActivityType::MomentTransferRequest,
                Subject::Transfer {
                    id: "t-1".to_string(),
                    counterparty: Some(UserId::new("friend".to_string())),
                    moment: moment("m-1"),
                },
            ),
            activity(
                "gift-in",
                ActivityType::MomentTransferReceived,
                Subject::Transfer {
                    id: "t-2".to_string(),
                    counterparty: None,
                    moment: moment("m-2"),
                },
            ),
            activity(
                "batch",
                ActivityType::MomentsTradeInRequest,
                Subject::TradeInBatch {
                    id: "ti-1".to_string(),
                    moment_ids: vec![
                        MomentId::new("m-3".to_string()),
                        MomentId::new("m-4".to_string()),
                    ],
                },
            ),
        ]
    }

    #[test]
    fn one_zero_row_per_gift_and_traded_moment() {
        let rows = synthesize(&feed(), &[], 10);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![10, 11, 12, 13]);

        assert_eq!(rows[0].activity_kind, ActivityKind::GiftSent);
        assert_eq!(rows[0].activity, "NBA Top Shot sale");
        assert_eq!(rows[0].payment_method, PaymentMethod::Gift);
        assert_eq!(rows[0].item.counterparty_id, Some(UserId::new("friend".to_string())));

        assert_eq!(rows[1].activity_kind, ActivityKind::GiftReceived);
        assert_eq!(rows[1].activity, "NBA Top Shot purchase");

        assert_eq!(rows[2].activity_kind, ActivityKind::TradeIn);
        assert_eq!(rows[2].matched_activity_id(), Some("batch/m-3"));
        assert_eq!(rows[3].item.moment_id, Some(MomentId::new("m-4".to_string())));
        assert!(rows.iter().all(|r| r.total_usd.is_zero() && !r.is_deposit_activity()));
    }

    #[test]
    fn already_represented_activities_are_skipped() {
        let first = synthesize(&feed(), &[], 1);
        let second = synthesize(&feed(), &first, 5);
        assert!(second.is_empty());
    }
}
