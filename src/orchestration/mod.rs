//! Drives the engine over live or cached feeds.

pub mod pipeline;
pub mod rates;

pub use pipeline::{Pipeline, PipelineSettings, Reconciliation};
pub use rates::RateOrchestrator;
