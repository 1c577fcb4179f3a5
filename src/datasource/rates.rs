//! Historical USD exchange rates from openexchangerates.org.

use super::{DataSourceError, JsonHttp, RateSource, RequestScheduler};
use crate::domain::{CurrencyCode, Decimal};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_RATES_URL: &str = "https://openexchangerates.org/api/historical";

#[derive(Debug, Deserialize)]
struct HistoricalRates {
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

#[derive(Debug, Clone)]
pub struct OpenExchangeRatesClient {
    http: JsonHttp,
    base_url: String,
    app_id: String,
    scheduler: Arc<RequestScheduler>,
}

impl OpenExchangeRatesClient {
    pub fn new(base_url: String, app_id: String, scheduler: Arc<RequestScheduler>) -> Self {
        Self {
            http: JsonHttp::new(),
            base_url,
            app_id,
            scheduler,
        }
    }

    fn url_for(&self, day: NaiveDate) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            day.format("%Y-%m-%d")
        )
    }
}

#[async_trait]
impl RateSource for OpenExchangeRatesClient {
    async fn fetch_rate(
        &self,
        day: NaiveDate,
        currency: &CurrencyCode,
    ) -> Result<Option<Decimal>, DataSourceError> {
        let url = self.url_for(day);
        let response: HistoricalRates = self
            .scheduler
            .run(|| {
                self.http
                    .send(|client| client.get(&url).query(&[("app_id", self.app_id.as_str())]))
            })
            .await?;
        Ok(response.rates.get(currency.as_str()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_url() {
        let client = OpenExchangeRatesClient::new(
            "https://rates.example/api/historical/".to_string(),
            "id".to_string(),
            Arc::new(RequestScheduler::default()),
        );
        let day = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(
            client.url_for(day),
            "https://rates.example/api/historical/2021-03-04.json"
        );
    }

    #[test]
    fn test_rates_body_decodes_numbers() {
        let body: HistoricalRates = serde_json::from_value(serde_json::json!({
            "base": "USD",
            "rates": { "AUD": 1.2917, "GBP": 0.7201 }
        }))
        .unwrap();
        let aud = body.rates.get("AUD").and_then(|r| r.to_f64()).unwrap();
        assert!((aud - 1.2917).abs() < 1e-9);
    }
}
