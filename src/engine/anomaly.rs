//! Soft failures collected during a run and surfaced to the operator.

use crate::domain::{iso_millis, LedgerRow};
use serde::Serialize;
use tracing::warn;

/// Row context attached to every anomaly so it can be reconciled by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowContext {
    pub row_id: u64,
    pub row_key: String,
    pub payment_id: String,
    pub date: String,
    pub activity: String,
    pub activity_kind: String,
}

impl RowContext {
    pub fn of(row: &LedgerRow) -> Self {
        Self {
            row_id: row.id,
            row_key: row.row_key(),
            payment_id: row.payment_id.clone(),
            date: iso_millis(&row.timestamp),
            activity: row.activity.clone(),
            activity_kind: row.activity_kind.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Anomaly {
    /// No candidate in either feed.
    NoMatchFound { row: RowContext },
    /// Several candidates survived; the first in feed order was taken.
    AmbiguousMatch {
        row: RowContext,
        chosen: String,
        candidates: Vec<String>,
    },
    /// Lots ran out before the withdrawal was covered.
    InsufficientDepositHistory {
        row: RowContext,
        uncovered_usd: String,
    },
    /// A sale with neither a pack nor a prior purchase behind it.
    UnresolvedSaleOrigin { row: RowContext },
    /// A pack whose contents could not be resolved or were empty.
    PackWithoutMoments { pack_id: String },
    /// An optional enrichment lookup failed; the run carried on without it.
    OptionalLookupFailure { lookup: String, detail: String },
}

impl Anomaly {
    pub fn label(&self) -> &'static str {
        match self {
            Anomaly::NoMatchFound { .. } => "NoMatchFound",
            Anomaly::AmbiguousMatch { .. } => "AmbiguousMatch",
            Anomaly::InsufficientDepositHistory { .. } => "InsufficientDepositHistory",
            Anomaly::UnresolvedSaleOrigin { .. } => "UnresolvedSaleOrigin",
            Anomaly::PackWithoutMoments { .. } => "PackWithoutMoments",
            Anomaly::OptionalLookupFailure { .. } => "OptionalLookupFailure",
        }
    }

    fn log(&self) {
        match self {
            Anomaly::NoMatchFound { row } | Anomaly::UnresolvedSaleOrigin { row } => warn!(
                "{}: payment_id={} date={} activity={} kind={}",
                self.label(),
                row.payment_id,
                row.date,
                row.activity,
                row.activity_kind
            ),
            Anomaly::AmbiguousMatch {
                row,
                chosen,
                candidates,
            } => warn!(
                "AmbiguousMatch: payment_id={} date={} kind={} chose {} of {:?}",
                row.payment_id, row.date, row.activity_kind, chosen, candidates
            ),
            Anomaly::InsufficientDepositHistory { row, uncovered_usd } => warn!(
                "InsufficientDepositHistory: payment_id={} date={} kind={} uncovered_usd={}",
                row.payment_id, row.date, row.activity_kind, uncovered_usd
            ),
            Anomaly::PackWithoutMoments { pack_id } => {
                warn!("PackWithoutMoments: pack {} needs manual reconciliation", pack_id)
            }
            Anomaly::OptionalLookupFailure { lookup, detail } => {
                warn!("OptionalLookupFailure: {} ({})", lookup, detail)
            }
        }
    }
}

/// Ordered collection of anomalies for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnomalyReport {
    anomalies: Vec<Anomaly>,
}

impl AnomalyReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log an anomaly.
    pub fn push(&mut self, anomaly: Anomaly) {
        anomaly.log();
        self.anomalies.push(anomaly);
    }

    pub fn extend(&mut self, other: AnomalyReport) {
        self.anomalies.extend(other.anomalies);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter()
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn count(&self, label: &str) -> usize {
        self.anomalies.iter().filter(|a| a.label() == label).count()
    }

    /// Row ids that ended up unmatched.
    pub fn unmatched_row_ids(&self) -> Vec<u64> {
        self.anomalies
            .iter()
            .filter_map(|a| match a {
                Anomaly::NoMatchFound { row } => Some(row.row_id),
                _ => None,
            })
            .collect()
    }

    /// One-line summary per anomaly kind, for the end-of-run log.
    pub fn summary(&self) -> Vec<(&'static str, usize)> {
        let mut out: Vec<(&'static str, usize)> = Vec::new();
        for anomaly in &self.anomalies {
            match out.iter_mut().find(|(label, _)| *label == anomaly.label()) {
                Some((_, n)) => *n += 1,
                None => out.push((anomaly.label(), 1)),
            }
        }
        out
    }
}
