//! Mock data source for testing without network calls.

use super::{DataSourceError, MarketplaceSource, Profile, RateSource, TrackerSource};
use crate::domain::{
    CurrencyCode, Decimal, ExternalActivity, MomentDetails, PackRef, SecondaryActivity, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock source serving every feed from predefined data.
///
/// Clones share their call counters, so a test can hand a clone to the
/// pipeline and inspect how often each feed was hit afterwards.
#[derive(Debug, Clone)]
pub struct MockDataSource {
    activities: Vec<ExternalActivity>,
    packs: HashMap<String, PackRef>,
    token_moments: HashMap<String, MomentDetails>,
    secondary: Vec<SecondaryActivity>,
    rates: HashMap<(NaiveDate, String), Decimal>,
    profile: Option<Profile>,
    fail_activity: bool,
    fail_tracker: bool,
    fail_token_lookups: bool,
    activity_calls: Arc<AtomicUsize>,
    tracker_calls: Arc<AtomicUsize>,
    rate_calls: Arc<AtomicUsize>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self {
            activities: Vec::new(),
            packs: HashMap::new(),
            token_moments: HashMap::new(),
            secondary: Vec::new(),
            rates: HashMap::new(),
            profile: None,
            fail_activity: false,
            fail_tracker: false,
            fail_token_lookups: false,
            activity_calls: Arc::new(AtomicUsize::new(0)),
            tracker_calls: Arc::new(AtomicUsize::new(0)),
            rate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_activity(mut self, activity: ExternalActivity) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn with_activities(mut self, activities: Vec<ExternalActivity>) -> Self {
        self.activities.extend(activities);
        self
    }

    /// Register the moment ids the marketplace reports for a pack.
    pub fn with_pack(mut self, pack: PackRef) -> Self {
        self.packs.insert(pack.id.clone(), pack);
        self
    }

    pub fn with_token_moment(mut self, token_id: &str, moment: MomentDetails) -> Self {
        self.token_moments.insert(token_id.to_string(), moment);
        self
    }

    pub fn with_secondary(mut self, sale: SecondaryActivity) -> Self {
        self.secondary.push(sale);
        self
    }

    pub fn with_rate(mut self, day: NaiveDate, currency: &str, rate: Decimal) -> Self {
        self.rates
            .insert((day, currency.to_ascii_uppercase()), rate);
        self
    }

    pub fn with_profile(mut self, dapper_id: &str, flow_address: &str) -> Self {
        self.profile = Some(Profile {
            dapper_id: UserId::new(dapper_id.to_string()),
            flow_address: flow_address.to_string(),
        });
        self
    }

    /// Make the activity feed fail with a network error.
    pub fn failing_activity(mut self) -> Self {
        self.fail_activity = true;
        self
    }

    pub fn failing_tracker(mut self) -> Self {
        self.fail_tracker = true;
        self
    }

    /// Make token and pack lookups fail.
    pub fn failing_lookups(mut self) -> Self {
        self.fail_token_lookups = true;
        self
    }

    pub fn activity_calls(&self) -> usize {
        self.activity_calls.load(Ordering::SeqCst)
    }

    pub fn tracker_calls(&self) -> usize {
        self.tracker_calls.load(Ordering::SeqCst)
    }

    pub fn rate_calls(&self) -> usize {
        self.rate_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(what: &str) -> DataSourceError {
    DataSourceError::NetworkError(format!("{} unavailable", what))
}

#[async_trait]
impl MarketplaceSource for MockDataSource {
    async fn fetch_activity(&self) -> Result<Vec<ExternalActivity>, DataSourceError> {
        self.activity_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_activity {
            return Err(unavailable("activity feed"));
        }
        Ok(self.activities.clone())
    }

    async fn fetch_pack_moments(&self, pack_ids: &[String]) -> Result<Vec<PackRef>, DataSourceError> {
        if self.fail_token_lookups {
            return Err(unavailable("pack lookup"));
        }
        Ok(pack_ids
            .iter()
            .filter_map(|id| self.packs.get(id))
            .cloned()
            .collect())
    }

    async fn find_moment_by_token(
        &self,
        token_id: &str,
    ) -> Result<Option<MomentDetails>, DataSourceError> {
        if self.fail_token_lookups {
            return Err(unavailable("token lookup"));
        }
        Ok(self.token_moments.get(token_id).cloned())
    }

    async fn fetch_profile(&self) -> Result<Profile, DataSourceError> {
        self.profile
            .clone()
            .ok_or_else(|| DataSourceError::Other("No profile configured".to_string()))
    }
}

#[async_trait]
impl TrackerSource for MockDataSource {
    async fn fetch_transactions(
        &self,
        _flow_address: &str,
    ) -> Result<Vec<SecondaryActivity>, DataSourceError> {
        self.tracker_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tracker {
            return Err(unavailable("tracker"));
        }
        Ok(self.secondary.clone())
    }
}

#[async_trait]
impl RateSource for MockDataSource {
    async fn fetch_rate(
        &self,
        day: NaiveDate,
        currency: &CurrencyCode,
    ) -> Result<Option<Decimal>, DataSourceError> {
        self.rate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rates
            .get(&(day, currency.as_str().to_string()))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MomentId;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()
    }

    #[tokio::test]
    async fn test_mock_rates_and_counters() {
        let mock = MockDataSource::new().with_rate(day(), "aud", Decimal::from_i64(2));
        let shared = mock.clone();
        let aud = CurrencyCode::parse("AUD").unwrap();
        let gbp = CurrencyCode::parse("GBP").unwrap();

        assert_eq!(mock.fetch_rate(day(), &aud).await.unwrap(), Some(Decimal::from_i64(2)));
        assert_eq!(mock.fetch_rate(day(), &gbp).await.unwrap(), None);
        assert_eq!(shared.rate_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_pack_lookup_omits_unknown() {
        let mock = MockDataSource::new().with_pack(PackRef {
            id: "p-1".to_string(),
            moment_ids: vec![MomentId::new("m-1".to_string())],
        });
        let packs = mock
            .fetch_pack_moments(&["p-1".to_string(), "p-2".to_string()])
            .await
            .unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].id, "p-1");
    }

    #[tokio::test]
    async fn test_mock_failure_toggles() {
        let mock = MockDataSource::new().failing_activity().failing_lookups();
        assert!(mock.fetch_activity().await.is_err());
        assert!(mock.find_moment_by_token("1").await.is_err());
        assert_eq!(mock.activity_calls(), 1);
        assert!(mock.fetch_profile().await.is_err());
    }

    #[test]
    fn test_mock_profile_blocking() {
        let mock = MockDataSource::new().with_profile("me", "0xabc");
        let profile = tokio_test::block_on(mock.fetch_profile()).unwrap();
        assert_eq!(profile.flow_address, "0xabc");
    }
}
