use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::export::ExportError;
use thiserror::Error;

/// Errors that abort a run. Everything recoverable is an `Anomaly` instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Required feed unavailable ({feed}): {detail}")]
    RequiredFeedUnavailable { feed: String, detail: String },
    #[error("Output error: {0}")]
    Export(#[from] ExportError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl AppError {
    pub fn feed_unavailable(feed: &str, detail: impl ToString) -> Self {
        AppError::RequiredFeedUnavailable {
            feed: feed.to_string(),
            detail: detail.to_string(),
        }
    }
}
