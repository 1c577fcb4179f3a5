//! JSON over HTTP with exponential backoff on transient failures.

use super::DataSourceError;
use crate::domain::Decimal;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JsonHttp {
    client: Client,
    max_elapsed: Duration,
}

impl JsonHttp {
    pub fn new() -> Self {
        Self::with_max_elapsed(Duration::from_secs(30))
    }

    pub fn with_max_elapsed(max_elapsed: Duration) -> Self {
        Self {
            client: Client::new(),
            max_elapsed,
        }
    }

    /// Send the request built by `build` and decode the JSON body.
    ///
    /// 429 and 5xx responses and connection failures are retried; other
    /// client errors and undecodable bodies are not.
    pub async fn send<T, F>(&self, build: F) -> Result<T, DataSourceError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = build(&self.client).send().await.map_err(|e| {
                backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

impl Default for JsonHttp {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric field that upstream APIs send either as a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireNumber {
    Text(String),
    Number(serde_json::Number),
}

impl WireNumber {
    pub(crate) fn to_decimal(&self) -> Result<Decimal, DataSourceError> {
        let raw = match self {
            WireNumber::Text(s) => s.clone(),
            WireNumber::Number(n) => n.to_string(),
        };
        Decimal::from_str_canonical(&raw)
            .map_err(|e| DataSourceError::ParseError(format!("Invalid number {}: {}", raw, e)))
    }

    pub(crate) fn to_u64(&self) -> Option<u64> {
        match self {
            WireNumber::Text(s) => s.trim().parse().ok(),
            WireNumber::Number(n) => n.as_u64(),
        }
    }
}
