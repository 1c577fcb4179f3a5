pub mod cache;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod export;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    DataSourceError, MarketplaceClient, MarketplaceSource, MockDataSource, RateSource,
    TrackerClient, TrackerSource,
};
pub use domain::{ActivityKind, Decimal, ExternalActivity, LedgerRow, SecondaryActivity, UserId};
pub use engine::{Anomaly, AnomalyReport};
pub use error::AppError;
pub use orchestration::{Pipeline, PipelineSettings, Reconciliation};
