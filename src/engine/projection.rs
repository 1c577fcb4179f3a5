//! Per-variant projection of feed payloads onto row item metadata.

use crate::domain::{
    ExternalActivity, ItemMetadata, MomentDetails, Role, SecondaryActivity, Subject,
};

fn item_label(player: &str, category: &str) -> String {
    format!("{}-{}", player, category)
}

/// Metadata for a single moment, as carried by orders, offers, transfers and trade-ins.
pub fn project_moment(moment: &MomentDetails, order_id: &str) -> ItemMetadata {
    ItemMetadata {
        item: Some(item_label(&moment.player_name, &moment.play_category)),
        player: Some(moment.player_name.clone()),
        play_category: Some(moment.play_category.clone()),
        order_id: Some(order_id.to_string()),
        moment_play_id: Some(moment.play_id.clone()),
        set_id: Some(moment.set_id.clone()),
        serial_number: moment.serial_number,
        set_information: moment.set_visual_id.clone(),
        moment_id: Some(moment.id.clone()),
        ..Default::default()
    }
}

/// Metadata for a primary-feed match.
pub fn project_primary(activity: &ExternalActivity) -> ItemMetadata {
    match &activity.subject {
        Subject::Order { id, moment, .. }
        | Subject::Offer { id, moment, .. }
        | Subject::Transfer { id, moment, .. }
        | Subject::TradeIn { id, moment } => project_moment(moment, id),
        Subject::PackOrder {
            id,
            quantity,
            listing_title,
            packs,
            ..
        } => ItemMetadata {
            item: Some(listing_title.clone()),
            order_id: Some(id.clone()),
            pack_ids: packs.iter().map(|p| p.id.clone()).collect(),
            is_pack: true,
            pack_quantity: quantity.unwrap_or(packs.len() as u32),
            ..Default::default()
        },
        Subject::TradeInBatch { id, .. } => ItemMetadata {
            order_id: Some(id.clone()),
            ..Default::default()
        },
    }
}

/// Metadata for a secondary-feed match. `role` is the caller's side of the sale.
///
/// The tracker has no marketplace moment id; that is filled in later from the
/// token lookup.
pub fn project_secondary(sale: &SecondaryActivity, role: Role) -> ItemMetadata {
    let mut item = ItemMetadata {
        serial_number: Some(sale.serial_number),
        ..Default::default()
    };
    if let Some(moment) = &sale.moment {
        item.item = Some(item_label(&moment.player_name, &moment.play_category));
        item.player = Some(moment.player_name.clone());
        item.play_category = Some(moment.play_category.clone());
        item.set_information = moment.set_visual_id.clone();
        item.moment_play_id = moment.play_id.clone();
        item.set_id = moment.set_id.clone();
    }
    enrich_from_secondary(&mut item, sale, role);
    item
}

/// Copy the tracker-only fields (team, token, counterparty) onto a row's metadata.
pub fn enrich_from_secondary(item: &mut ItemMetadata, sale: &SecondaryActivity, role: Role) {
    item.team = sale.moment.as_ref().and_then(|m| m.team.clone());
    item.flow_token_id = sale.token_id.clone();
    if let Some(counterparty) = sale.party(role.other()) {
        item.counterparty_id = Some(counterparty.dapper_id.clone());
        item.counterparty_name = counterparty.username.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActivityType, Decimal, FeedStatus, MomentId, PackRef, Party, SecondaryMoment, UserId,
    };
    use chrono::{TimeZone, Utc};

    fn moment() -> MomentDetails {
        MomentDetails {
            id: MomentId::new("m-1".to_string()),
            play_id: "play-1".to_string(),
            player_name: "Ja Morant".to_string(),
            play_category: "Dunk".to_string(),
            set_id: "set-1".to_string(),
            set_visual_id: Some("SET_VISUAL_COMMON".to_string()),
            serial_number: Some(1234),
            tier: None,
        }
    }

    fn activity(subject: Subject, activity_type: ActivityType) -> ExternalActivity {
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();
        ExternalActivity {
            id: "a-1".to_string(),
            activity_type,
            status: FeedStatus::Success,
            created_at: ts,
            updated_at: ts,
            subject,
        }
    }

    #[test]
    fn order_projects_moment_fields() {
        let a = activity(
            Subject::Order {
                id: "o-1".to_string(),
                price: Decimal::from_i64(10),
                moment: moment(),
            },
            ActivityType::PurchaseP2pMoment,
        );
        let item = project_primary(&a);
        assert_eq!(item.item.as_deref(), Some("Ja Morant-Dunk"));
        assert_eq!(item.order_id.as_deref(), Some("o-1"));
        assert_eq!(item.serial_number, Some(1234));
        assert_eq!(item.moment_id, Some(MomentId::new("m-1".to_string())));
        assert!(!item.is_pack);
    }

    #[test]
    fn pack_order_projects_listing_and_ids() {
        let a = activity(
            Subject::PackOrder {
                id: "o-2".to_string(),
                price: Decimal::from_i64(9),
                quantity: None,
                listing_title: "Base Set Pack".to_string(),
                listing_price: Some(Decimal::from_i64(9)),
                packs: vec![
                    PackRef {
                        id: "p-1".to_string(),
                        moment_ids: vec![],
                    },
                    PackRef {
                        id: "p-2".to_string(),
                        moment_ids: vec![],
                    },
                ],
            },
            ActivityType::PurchasePack,
        );
        let item = project_primary(&a);
        assert!(item.is_pack);
        assert_eq!(item.pack_quantity, 2);
        assert_eq!(item.set_or_pack_ids().as_deref(), Some("p-1,p-2"));
        assert_eq!(item.general_path(), None);
    }

    #[test]
    fn secondary_projects_counterparty_of_other_role() {
        let sale = SecondaryActivity::new(
            Some(Party {
                dapper_id: UserId::new("buyer".to_string()),
                username: Some("bob".to_string()),
            }),
            Some(Party {
                dapper_id: UserId::new("me".to_string()),
                username: Some("alice".to_string()),
            }),
            77,
            Decimal::from_i64(25),
            Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap(),
            Some("9001".to_string()),
            None,
            Some(SecondaryMoment {
                player_name: "Ja Morant".to_string(),
                play_category: "Dunk".to_string(),
                set_visual_id: None,
                play_id: Some("play-1".to_string()),
                set_id: Some("set-1".to_string()),
                team: Some("Memphis Grizzlies".to_string()),
            }),
        );
        let item = project_secondary(&sale, Role::Seller);
        assert_eq!(item.counterparty_name.as_deref(), Some("bob"));
        assert_eq!(item.flow_token_id.as_deref(), Some("9001"));
        assert_eq!(item.team.as_deref(), Some("Memphis Grizzlies"));
        assert_eq!(item.serial_number, Some(77));
        assert_eq!(item.moment_id, None);
    }
}
