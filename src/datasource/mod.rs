//! Data source abstraction for the marketplace feed, the secondary sales
//! tracker and the exchange-rate provider.

use crate::domain::{
    CurrencyCode, Decimal, ExternalActivity, MomentDetails, PackRef, SecondaryActivity, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod marketplace;
pub mod mock;
mod queries;
pub mod rates;
pub mod scheduler;
pub mod tracker;

pub use http::JsonHttp;
pub use marketplace::MarketplaceClient;
pub use mock::MockDataSource;
pub use rates::OpenExchangeRatesClient;
pub use scheduler::RequestScheduler;
pub use tracker::TrackerClient;

/// The caller's marketplace identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub dapper_id: UserId,
    pub flow_address: String,
}

/// Marketplace GraphQL API.
///
/// Implementations must handle pagination and retry/backoff.
#[async_trait]
pub trait MarketplaceSource: Send + Sync + fmt::Debug {
    /// Every activity of the caller, newest first as the marketplace returns them.
    async fn fetch_activity(&self) -> Result<Vec<ExternalActivity>, DataSourceError>;

    /// Moment ids contained in each pack. Packs unknown to the marketplace are omitted.
    async fn fetch_pack_moments(&self, pack_ids: &[String]) -> Result<Vec<PackRef>, DataSourceError>;

    /// Look a minted moment up by its on-chain token id.
    async fn find_moment_by_token(
        &self,
        token_id: &str,
    ) -> Result<Option<MomentDetails>, DataSourceError>;

    /// Profile of the token holder.
    async fn fetch_profile(&self) -> Result<Profile, DataSourceError>;
}

/// Secondary sales tracker.
#[async_trait]
pub trait TrackerSource: Send + Sync + fmt::Debug {
    /// Every tracked sale where the address was buyer or seller.
    async fn fetch_transactions(
        &self,
        flow_address: &str,
    ) -> Result<Vec<SecondaryActivity>, DataSourceError>;
}

/// Historical exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync + fmt::Debug {
    /// USD -> `currency` rate for a calendar day, `None` if the provider has none.
    async fn fetch_rate(
        &self,
        day: NaiveDate,
        currency: &CurrencyCode,
    ) -> Result<Option<Decimal>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    #[error("Parse error: {0}")]
    ParseError(String),
    /// GraphQL `errors` array in an otherwise successful response
    #[error("GraphQL error: {0}")]
    GraphQl(String),
    /// Rate limit exceeded (caller should implement backoff)
    #[error("Rate limited")]
    RateLimited,
    /// Other error
    #[error("Error: {0}")]
    Other(String),
}
