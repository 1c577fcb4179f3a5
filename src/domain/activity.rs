//! Primary marketplace activity, decoded once at the feed boundary.
//!
//! The marketplace nests the interesting payload under a different field for
//! each activity type (`order`, `offer`, `transfer`, `tradeIn`). Here each
//! shape is its own `Subject` variant carrying only the fields it has.

use crate::domain::{Decimal, MomentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    #[serde(rename = "PURCHASE_VENDOR_MOMENT")]
    PurchaseVendorMoment,
    #[serde(rename = "PURCHASE_PACK")]
    PurchasePack,
    #[serde(rename = "PURCHASE_PACK_WITH_TICKETS")]
    PurchasePackWithTickets,
    #[serde(rename = "MOMENT_TRANSFER_RECEIVED")]
    MomentTransferReceived,
    #[serde(rename = "MOMENT_TRANSFER_REQUEST")]
    MomentTransferRequest,
    #[serde(rename = "PURCHASE_P2P_MOMENT")]
    PurchaseP2pMoment,
    #[serde(rename = "P2P_MOMENT_LISTING_SOLD")]
    P2pMomentListingSold,
    #[serde(rename = "MOMENT_TRADE_IN_REQUEST")]
    MomentTradeInRequest,
    #[serde(rename = "MOMENTS_TRADE_IN_REQUEST")]
    MomentsTradeInRequest,
    #[serde(rename = "OFFER_AVAILABLE")]
    OfferAvailable,
    #[serde(rename = "OFFER_COMPLETED")]
    OfferCompleted,
}

impl ActivityType {
    /// Every type requested from the activity search.
    pub const ALL: [ActivityType; 11] = [
        ActivityType::PurchaseVendorMoment,
        ActivityType::PurchasePack,
        ActivityType::PurchasePackWithTickets,
        ActivityType::MomentTransferReceived,
        ActivityType::MomentTransferRequest,
        ActivityType::PurchaseP2pMoment,
        ActivityType::P2pMomentListingSold,
        ActivityType::MomentTradeInRequest,
        ActivityType::MomentsTradeInRequest,
        ActivityType::OfferAvailable,
        ActivityType::OfferCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::PurchaseVendorMoment => "PURCHASE_VENDOR_MOMENT",
            ActivityType::PurchasePack => "PURCHASE_PACK",
            ActivityType::PurchasePackWithTickets => "PURCHASE_PACK_WITH_TICKETS",
            ActivityType::MomentTransferReceived => "MOMENT_TRANSFER_RECEIVED",
            ActivityType::MomentTransferRequest => "MOMENT_TRANSFER_REQUEST",
            ActivityType::PurchaseP2pMoment => "PURCHASE_P2P_MOMENT",
            ActivityType::P2pMomentListingSold => "P2P_MOMENT_LISTING_SOLD",
            ActivityType::MomentTradeInRequest => "MOMENT_TRADE_IN_REQUEST",
            ActivityType::MomentsTradeInRequest => "MOMENTS_TRADE_IN_REQUEST",
            ActivityType::OfferAvailable => "OFFER_AVAILABLE",
            ActivityType::OfferCompleted => "OFFER_COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == raw)
    }

    /// Gifts and trade-ins carry no money and never match an export row.
    pub fn is_non_monetary(&self) -> bool {
        matches!(
            self,
            ActivityType::MomentTransferRequest
                | ActivityType::MomentTransferReceived
                | ActivityType::MomentTradeInRequest
                | ActivityType::MomentsTradeInRequest
        )
    }

    pub fn is_offer(&self) -> bool {
        matches!(self, ActivityType::OfferAvailable | ActivityType::OfferCompleted)
    }

    pub fn is_pack(&self) -> bool {
        matches!(
            self,
            ActivityType::PurchasePack | ActivityType::PurchasePackWithTickets
        )
    }

    /// A purchase of a single moment from another collector.
    pub fn is_p2p_purchase(&self) -> bool {
        matches!(self, ActivityType::PurchaseP2pMoment | ActivityType::OfferAvailable)
    }

    /// A moment sold to another collector; these pay the platform fee.
    pub fn is_p2p_sale(&self) -> bool {
        matches!(self, ActivityType::P2pMomentListingSold | ActivityType::OfferCompleted)
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(other)]
    Other,
}

/// Moment fields shared by every moment-bearing subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentDetails {
    pub id: MomentId,
    pub play_id: String,
    pub player_name: String,
    pub play_category: String,
    pub set_id: String,
    pub set_visual_id: Option<String>,
    pub serial_number: Option<u64>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackRef {
    pub id: String,
    pub moment_ids: Vec<MomentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    /// Vendor or P2P moment order.
    Order {
        id: String,
        price: Decimal,
        moment: MomentDetails,
    },
    /// Pack drop order; one order may contain several packs.
    PackOrder {
        id: String,
        price: Decimal,
        quantity: Option<u32>,
        listing_title: String,
        listing_price: Option<Decimal>,
        packs: Vec<PackRef>,
    },
    Offer {
        id: String,
        price: Decimal,
        completed: bool,
        purchased: bool,
        moment: MomentDetails,
    },
    /// Gift in either direction; `counterparty` is the other collector.
    Transfer {
        id: String,
        counterparty: Option<UserId>,
        moment: MomentDetails,
    },
    TradeIn {
        id: String,
        moment: MomentDetails,
    },
    TradeInBatch {
        id: String,
        moment_ids: Vec<MomentId>,
    },
}

impl Subject {
    pub fn id(&self) -> &str {
        match self {
            Subject::Order { id, .. }
            | Subject::PackOrder { id, .. }
            | Subject::Offer { id, .. }
            | Subject::Transfer { id, .. }
            | Subject::TradeIn { id, .. }
            | Subject::TradeInBatch { id, .. } => id,
        }
    }
}

/// One record from the marketplace activity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalActivity {
    pub id: String,
    pub activity_type: ActivityType,
    pub status: FeedStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub subject: Subject,
}

impl ExternalActivity {
    pub fn is_success(&self) -> bool {
        self.status == FeedStatus::Success
    }

    /// Listed price, absent for gifts and trade-ins.
    pub fn price(&self) -> Option<Decimal> {
        match &self.subject {
            Subject::Order { price, .. }
            | Subject::PackOrder { price, .. }
            | Subject::Offer { price, .. } => Some(*price),
            _ => None,
        }
    }

    pub fn moment(&self) -> Option<&MomentDetails> {
        match &self.subject {
            Subject::Order { moment, .. }
            | Subject::Offer { moment, .. }
            | Subject::Transfer { moment, .. }
            | Subject::TradeIn { moment, .. } => Some(moment),
            _ => None,
        }
    }

    /// Instant the export row should line up with.
    ///
    /// Offers are filled long after they are created, so `updatedAt` is used.
    pub fn match_instant(&self) -> DateTime<Utc> {
        if self.activity_type.is_offer() {
            self.updated_at
        } else {
            self.created_at
        }
    }

    /// Offers only count once they were both completed and purchased.
    pub fn is_filled_offer(&self) -> bool {
        match &self.subject {
            Subject::Offer {
                completed,
                purchased,
                ..
            } => *completed && *purchased,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn moment() -> MomentDetails {
        MomentDetails {
            id: MomentId::new("m-1".to_string()),
            play_id: "play-1".to_string(),
            player_name: "LeBron James".to_string(),
            play_category: "Dunk".to_string(),
            set_id: "set-1".to_string(),
            set_visual_id: Some("SET_VISUAL_LEGENDARY".to_string()),
            serial_number: Some(42),
            tier: None,
        }
    }

    #[test]
    fn test_activity_type_roundtrips_wire_names() {
        for t in ActivityType::ALL {
            assert_eq!(ActivityType::parse(t.as_str()), Some(t));
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_offer_matches_on_updated_at() {
        let created = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2021, 3, 5, 10, 0, 0).unwrap();
        let offer = ExternalActivity {
            id: "a-1".to_string(),
            activity_type: ActivityType::OfferAvailable,
            status: FeedStatus::Success,
            created_at: created,
            updated_at: updated,
            subject: Subject::Offer {
                id: "o-1".to_string(),
                price: Decimal::from_i64(5),
                completed: true,
                purchased: false,
                moment: moment(),
            },
        };
        assert_eq!(offer.match_instant(), updated);
        assert!(!offer.is_filled_offer());
        assert_eq!(offer.moment().map(|m| m.serial_number), Some(Some(42)));
    }

    #[test]
    fn test_unknown_status_decodes_as_other() {
        let status: FeedStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(status, FeedStatus::Other);
    }
}
