//! Ledger row: one accounting event from the export or synthesized from the feed.

use crate::domain::{
    ActivityType, CurrencyCode, Decimal, ForexRealization, MomentId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Public web root used to render moment and listing links.
pub const MARKET_WEB_URL: &str = "https://nbatopshot.com";

/// Balance movements that never correspond to a marketplace activity.
const IGNORED_FOR_MATCHING: [&str; 5] = [
    "Dapper adjustment",
    "Dapper withdrawal",
    "Dapper purchase",
    "Dapper receive",
    "NBA Top Shot receive",
];

/// Balance top-ups that credit the account without a sale.
const BALANCE_CREDITS: [&str; 3] = ["Dapper purchase", "Dapper receive", "Dapper adjustment"];

const OFFER_SALE: &str = "Dapper offer sale";
const OFFER_PURCHASE: &str = "Dapper ACCEPTED";
const BALANCE_WITHDRAWAL: &str = "Dapper withdrawal";

/// What the row means for the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    Sale,
    Purchase,
    PackPurchase,
    GiftSent,
    GiftReceived,
    TradeIn,
    /// Dapper balance top-up, receive or adjustment.
    Deposit,
    /// Dapper balance cash-out.
    Withdrawal,
    Other,
}

impl ActivityKind {
    /// Derive the kind from the export's activity name.
    pub fn from_activity_name(activity: &str) -> Self {
        let activity = activity.trim();
        if activity == OFFER_PURCHASE {
            return ActivityKind::Purchase;
        }
        if BALANCE_CREDITS.contains(&activity) {
            return ActivityKind::Deposit;
        }
        if activity == BALANCE_WITHDRAWAL {
            return ActivityKind::Withdrawal;
        }
        match activity.rsplit(' ').next().map(str::to_ascii_lowercase).as_deref() {
            Some("sale") => ActivityKind::Sale,
            Some("purchase") => ActivityKind::Purchase,
            _ => ActivityKind::Other,
        }
    }

    /// Gift and trade-in rows are never part of the export.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            ActivityKind::GiftSent | ActivityKind::GiftReceived | ActivityKind::TradeIn
        )
    }

    /// Whether the caller is on the selling side of the event.
    pub fn is_sell_side(&self) -> bool {
        matches!(
            self,
            ActivityKind::Sale | ActivityKind::GiftSent | ActivityKind::TradeIn
        )
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActivityKind::Sale => "sale",
            ActivityKind::Purchase => "purchase",
            ActivityKind::PackPurchase => "pack purchase",
            ActivityKind::GiftSent => "gift sent",
            ActivityKind::GiftReceived => "gift received",
            ActivityKind::TradeIn => "trade in",
            ActivityKind::Deposit => "deposit",
            ActivityKind::Withdrawal => "withdrawal",
            ActivityKind::Other => "other",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowStatus {
    Succeeded,
    Cancelled,
    Failed,
    Pending,
}

impl RowStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCEEDED" | "SUCCESS" => RowStatus::Succeeded,
            "CANCELLED" | "CANCELED" => RowStatus::Cancelled,
            "FAILED" => RowStatus::Failed,
            _ => RowStatus::Pending,
        }
    }

    pub fn as_export_str(&self) -> &'static str {
        match self {
            RowStatus::Succeeded => "SUCCEEDED",
            RowStatus::Cancelled => "CANCELLED",
            RowStatus::Failed => "FAILED",
            RowStatus::Pending => "PENDING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    DapperBalance,
    /// Card payments settle outside the platform balance.
    Card(String),
    Gift,
    TradeIn,
    Other(String),
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let upper = raw.to_ascii_uppercase();
        match upper.as_str() {
            "DAPPER BALANCE" => PaymentMethod::DapperBalance,
            "GIFT" => PaymentMethod::Gift,
            "TRADE IN" => PaymentMethod::TradeIn,
            "VISA" | "MASTERCARD" | "AMEX" | "DISCOVER" => PaymentMethod::Card(raw.to_string()),
            _ if upper.contains("CARD") => PaymentMethod::Card(raw.to_string()),
            _ => PaymentMethod::Other(raw.to_string()),
        }
    }

    pub fn as_export_str(&self) -> &str {
        match self {
            PaymentMethod::DapperBalance => "Dapper Balance",
            PaymentMethod::Gift => "Gift",
            PaymentMethod::TradeIn => "Trade In",
            PaymentMethod::Card(raw) | PaymentMethod::Other(raw) => raw,
        }
    }
}

/// Which feed supplied the row's matched activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchSource {
    #[default]
    None,
    Primary,
    Secondary,
}

impl MatchSource {
    /// Label written to the `main_data_source` column.
    pub fn output_label(&self) -> &'static str {
        match self {
            MatchSource::None => "",
            MatchSource::Primary => "topShot",
            MatchSource::Secondary => "momentRanks",
        }
    }
}

/// Item metadata projected from whichever feed matched the row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub item: Option<String>,
    pub player: Option<String>,
    pub play_category: Option<String>,
    pub team: Option<String>,
    pub flow_token_id: Option<String>,
    pub counterparty_id: Option<UserId>,
    pub counterparty_name: Option<String>,
    pub order_id: Option<String>,
    pub moment_play_id: Option<String>,
    pub set_id: Option<String>,
    pub pack_ids: Vec<String>,
    pub serial_number: Option<u64>,
    pub set_information: Option<String>,
    pub is_pack: bool,
    pub pack_quantity: u32,
    pub moment_id: Option<MomentId>,
}

impl ItemMetadata {
    /// Listing page for the moment's edition (set + play).
    pub fn general_path(&self) -> Option<String> {
        match (&self.set_id, &self.moment_play_id) {
            (Some(set), Some(play)) if !self.is_pack => {
                Some(format!("{}/listings/p2p/{}+{}", MARKET_WEB_URL, set, play))
            }
            _ => None,
        }
    }

    /// Page for the exact serial.
    pub fn serial_path(&self) -> Option<String> {
        self.moment_id
            .as_ref()
            .map(|id| format!("{}/moment/{}", MARKET_WEB_URL, id))
    }

    /// `set_or_pack_ids` column: pack ids for packs, set id otherwise.
    pub fn set_or_pack_ids(&self) -> Option<String> {
        if self.is_pack {
            Some(self.pack_ids.join(","))
        } else {
            self.set_id.clone()
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("row {row_id} is already bound to activity {existing}")]
pub struct AlreadyMatched {
    pub row_id: u64,
    pub existing: String,
}

/// One accounting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Sequence number, assigned after the chronological sort.
    pub id: u64,
    /// Activity name as written by the export.
    pub activity: String,
    pub timestamp: DateTime<Utc>,
    pub activity_kind: ActivityKind,
    pub status: RowStatus,
    pub payment_method: PaymentMethod,
    pub payment_id: String,
    pub subtotal_usd: Decimal,
    pub fee_usd: Decimal,
    pub total_usd: Decimal,
    matched_activity_id: Option<String>,
    match_source: MatchSource,
    /// Primary-feed activity type of the match (`activity_details` column).
    pub activity_details: Option<ActivityType>,
    pub item: ItemMetadata,
    pub sale_fee_usd: Option<Decimal>,
    pub currency: Option<CurrencyCode>,
    pub secondary_currency_rate: Option<Decimal>,
    pub sale_profit_usd: Option<Decimal>,
    pub sale_profit_secondary: Option<Decimal>,
    pub from_pack_id: Option<String>,
    pub days_held: Option<i64>,
    pub account_balance_usd: Option<Decimal>,
    pub account_balance_secondary: Option<Decimal>,
    pub forex_realization: Option<ForexRealization>,
    pub selected_timezone: Option<String>,
    pub local_timestamp: Option<String>,
}

impl LedgerRow {
    /// Build a row from the export's eight columns. The id is assigned later.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activity: String,
        timestamp: DateTime<Utc>,
        status: RowStatus,
        payment_method: PaymentMethod,
        payment_id: String,
        subtotal_usd: Decimal,
        fee_usd: Decimal,
        total_usd: Decimal,
    ) -> Self {
        let activity_kind = ActivityKind::from_activity_name(&activity);
        Self {
            id: 0,
            activity,
            timestamp,
            activity_kind,
            status,
            payment_method,
            payment_id,
            subtotal_usd,
            fee_usd,
            total_usd,
            matched_activity_id: None,
            match_source: MatchSource::None,
            activity_details: None,
            item: ItemMetadata::default(),
            sale_fee_usd: None,
            currency: None,
            secondary_currency_rate: None,
            sale_profit_usd: None,
            sale_profit_secondary: None,
            from_pack_id: None,
            days_held: None,
            account_balance_usd: None,
            account_balance_secondary: None,
            forex_realization: None,
            selected_timezone: None,
            local_timestamp: None,
        }
    }

    pub fn matched_activity_id(&self) -> Option<&str> {
        self.matched_activity_id.as_deref()
    }

    pub fn match_source(&self) -> MatchSource {
        self.match_source
    }

    pub fn is_matched(&self) -> bool {
        self.matched_activity_id.is_some()
    }

    /// Bind an external activity to this row. A binding is permanent.
    pub fn bind_match(&mut self, activity_id: String, source: MatchSource) -> Result<(), AlreadyMatched> {
        if let Some(existing) = &self.matched_activity_id {
            return Err(AlreadyMatched {
                row_id: self.id,
                existing: existing.clone(),
            });
        }
        self.matched_activity_id = Some(activity_id);
        self.match_source = source;
        Ok(())
    }

    /// Attach the day's USD -> currency rate.
    pub fn set_rate(&mut self, currency: CurrencyCode, rate: Decimal) {
        self.currency = Some(currency);
        self.secondary_currency_rate = Some(rate);
    }

    /// `total_usd` expressed in the secondary currency at the row's own rate.
    pub fn total_secondary(&self) -> Option<Decimal> {
        self.secondary_currency_rate.map(|rate| rate * self.total_usd)
    }

    /// Convert a USD amount at the row's rate, rounded to cents.
    pub fn to_secondary(&self, usd: Decimal) -> Option<Decimal> {
        self.secondary_currency_rate.map(|rate| (usd * rate).round2())
    }

    /// Stable key for anomaly reports.
    ///
    /// Priority: `payment_id` (if present) > hash of activity, instant and total.
    pub fn row_key(&self) -> String {
        if !self.payment_id.trim().is_empty() {
            return self.payment_id.trim().to_string();
        }

        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, &self.activity);
        hash_var(&mut hasher, &crate::domain::iso_millis(&self.timestamp));
        hash_var(&mut hasher, &self.total_usd.to_canonical_string());
        if let Some(id) = &self.matched_activity_id {
            hash_var(&mut hasher, id);
        }
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == RowStatus::Succeeded
    }

    pub fn is_card_funded(&self) -> bool {
        matches!(self.payment_method, PaymentMethod::Card(_))
    }

    /// Offer sale or accepted offer purchase.
    pub fn is_offer(&self) -> bool {
        matches!(self.activity.trim(), OFFER_SALE | OFFER_PURCHASE)
    }

    pub fn is_pack(&self) -> bool {
        self.activity_kind == ActivityKind::PackPurchase || self.item.is_pack
    }

    /// Credits the platform balance.
    pub fn is_deposit_activity(&self) -> bool {
        if self.activity_kind.is_synthetic() {
            return false;
        }
        let activity = self.activity.trim();
        activity.ends_with(" sale") || BALANCE_CREDITS.contains(&activity)
    }

    /// Debits the platform balance. Never true together with `is_deposit_activity`.
    pub fn is_withdrawal_activity(&self) -> bool {
        if self.activity_kind.is_synthetic() || self.is_deposit_activity() {
            return false;
        }
        let activity = self.activity.trim();
        activity.ends_with(" purchase") || activity == BALANCE_WITHDRAWAL || activity == OFFER_PURCHASE
    }

    /// Balance movements already represented in the export.
    pub fn is_ignorable_for_matching(&self) -> bool {
        IGNORED_FOR_MATCHING.contains(&self.activity.trim())
    }

    /// Whether the row moves the on-platform balance at all.
    pub fn moves_balance(&self) -> bool {
        self.is_succeeded() && !self.is_card_funded()
    }
}
