//! Domain types for the reconciled ledger.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Primitives: UserId, MomentId, CurrencyCode and ISO instant helpers
//! - The LedgerRow model and its classification predicates
//! - External feed records (marketplace activity, tracker sales)
//! - Pack records and FIFO deposit lots

pub mod activity;
pub mod decimal;
pub mod ledger_row;
pub mod lot;
pub mod pack;
pub mod primitives;
pub mod secondary;

pub use activity::{ActivityType, ExternalActivity, FeedStatus, MomentDetails, PackRef, Subject};
pub use decimal::Decimal;
pub use ledger_row::{
    ActivityKind, AlreadyMatched, ItemMetadata, LedgerRow, MatchSource, PaymentMethod, RowStatus,
    MARKET_WEB_URL,
};
pub use lot::{DepositLot, ForexRealization, LotUsage};
pub use pack::{PackRecord, PackRegistry};
pub use primitives::{
    brief_date, iso_millis, parse_instant, CurrencyCode, CurrencyParseError, MomentId, UserId,
};
pub use secondary::{Party, Role, SecondaryActivity, SecondaryMoment};
