//! Per-day exchange rates, read through a persistent cache.

use crate::cache::CachePort;
use crate::datasource::RateSource;
use crate::domain::{CurrencyCode, Decimal, LedgerRow};
use crate::engine::{Anomaly, AnomalyReport};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RateOrchestrator {
    source: Arc<dyn RateSource>,
    cache: Box<dyn CachePort<NaiveDate, Decimal>>,
    currency: CurrencyCode,
    unavailable: HashSet<NaiveDate>,
}

impl RateOrchestrator {
    pub fn new(
        source: Arc<dyn RateSource>,
        cache: Box<dyn CachePort<NaiveDate, Decimal>>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            source,
            cache,
            currency,
            unavailable: HashSet::new(),
        }
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Rate for `day`, from the cache or else the provider.
    ///
    /// A fetched rate is persisted before it is returned. A day the provider
    /// could not serve is reported once and not retried within the run.
    pub async fn rate_for(&mut self, day: NaiveDate, anomalies: &mut AnomalyReport) -> Option<Decimal> {
        if let Some(rate) = self.cache.get(&day) {
            return Some(rate);
        }
        if self.unavailable.contains(&day) {
            return None;
        }

        let detail = match self.source.fetch_rate(day, &self.currency).await {
            Ok(Some(rate)) => {
                debug!("Fetched {} rate for {}: {}", self.currency, day, rate);
                if let Err(e) = self.cache.put(day, rate) {
                    warn!("Could not persist {} rate for {}: {}", self.currency, day, e);
                }
                return Some(rate);
            }
            Ok(None) => format!("no {} rate published", self.currency),
            Err(e) => e.to_string(),
        };

        self.unavailable.insert(day);
        anomalies.push(Anomaly::OptionalLookupFailure {
            lookup: format!("exchange rate {}", day),
            detail,
        });
        None
    }

    /// Attach a rate to every row that lacks one. One lookup per distinct day.
    pub async fn attach_rates(&mut self, rows: &mut [LedgerRow], anomalies: &mut AnomalyReport) -> usize {
        let days: BTreeSet<NaiveDate> = rows
            .iter()
            .filter(|r| r.secondary_currency_rate.is_none())
            .map(|r| r.timestamp.date_naive())
            .collect();
        if days.is_empty() {
            return 0;
        }

        let mut attached = 0;
        for day in days {
            let Some(rate) = self.rate_for(day, anomalies).await else {
                continue;
            };
            for row in rows
                .iter_mut()
                .filter(|r| r.secondary_currency_rate.is_none() && r.timestamp.date_naive() == day)
            {
                row.set_rate(self.currency.clone(), rate);
                attached += 1;
            }
        }
        info!("Attached {} rates to {} rows", self.currency, attached);
        attached
    }
}

impl std::fmt::Debug for RateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateOrchestrator")
            .field("source", &self.source)
            .field("currency", &self.currency)
            .finish()
    }
}
