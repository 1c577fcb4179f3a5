use crate::datasource::marketplace::DEFAULT_MARKETPLACE_URL;
use crate::datasource::rates::DEFAULT_RATES_URL;
use crate::datasource::tracker::DEFAULT_TRACKER_URL;
use crate::domain::{CurrencyCode, Decimal, UserId};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub export_path: PathBuf,
    /// Resolved from the marketplace profile when unset.
    pub dapper_id: Option<UserId>,
    pub flow_address: Option<String>,
    pub topshot_token: Option<String>,
    pub marketplace_api_url: String,
    pub tracker_api_url: String,
    pub rates_api_url: String,
    pub rates_app_id: Option<String>,
    pub target_currency: Option<CurrencyCode>,
    pub timezone: Tz,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub platform_fee_rate: Decimal,
    pub request_spacing_ms: u64,
    pub offline: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn non_empty(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_bool(env_map: &HashMap<String, String>, key: &str) -> Result<bool, ConfigError> {
    match non_empty(env_map, key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be true or false, got {}", other),
        )),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let export_path = non_empty(&env_map, "EXPORT_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnv("EXPORT_PATH".to_string()))?;

        let offline = parse_bool(&env_map, "OFFLINE")?;

        let topshot_token = non_empty(&env_map, "TOPSHOT_TOKEN");
        if topshot_token.is_none() && !offline {
            return Err(ConfigError::MissingEnv("TOPSHOT_TOKEN".to_string()));
        }

        let dapper_id = non_empty(&env_map, "DAPPER_ID").map(UserId::new);
        let flow_address = non_empty(&env_map, "FLOW_ADDRESS");
        if offline {
            // No token to resolve the profile with.
            if dapper_id.is_none() {
                return Err(ConfigError::MissingEnv("DAPPER_ID".to_string()));
            }
            if flow_address.is_none() {
                return Err(ConfigError::MissingEnv("FLOW_ADDRESS".to_string()));
            }
        }

        let target_currency = match non_empty(&env_map, "TARGET_CURRENCY") {
            Some(raw) => Some(CurrencyCode::parse(&raw).map_err(|_| {
                ConfigError::InvalidValue(
                    "TARGET_CURRENCY".to_string(),
                    format!("must be a three-letter currency code, got {}", raw),
                )
            })?),
            None => None,
        };

        let rates_app_id = non_empty(&env_map, "RATES_APP_ID");
        if target_currency.is_some() && rates_app_id.is_none() {
            return Err(ConfigError::MissingEnv("RATES_APP_ID".to_string()));
        }

        let timezone = env_map
            .get("TIMEZONE")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("UTC")
            .parse::<Tz>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "TIMEZONE".to_string(),
                    "must be an IANA zone name such as America/Phoenix".to_string(),
                )
            })?;

        let platform_fee_rate = env_map
            .get("PLATFORM_FEE_RATE")
            .map(|s| s.as_str())
            .unwrap_or("0.05")
            .parse::<Decimal>()
            .ok()
            .filter(|r| !r.is_negative() && *r < Decimal::one())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PLATFORM_FEE_RATE".to_string(),
                    "must be a decimal in [0, 1)".to_string(),
                )
            })?;

        let request_spacing_ms = env_map
            .get("REQUEST_SPACING_MS")
            .map(|s| s.as_str())
            .unwrap_or("25")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "REQUEST_SPACING_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        Ok(Config {
            export_path,
            dapper_id,
            flow_address,
            topshot_token,
            marketplace_api_url: non_empty(&env_map, "MARKETPLACE_API_URL")
                .unwrap_or_else(|| DEFAULT_MARKETPLACE_URL.to_string()),
            tracker_api_url: non_empty(&env_map, "TRACKER_API_URL")
                .unwrap_or_else(|| DEFAULT_TRACKER_URL.to_string()),
            rates_api_url: non_empty(&env_map, "RATES_API_URL")
                .unwrap_or_else(|| DEFAULT_RATES_URL.to_string()),
            rates_app_id,
            target_currency,
            timezone,
            cache_dir: non_empty(&env_map, "CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".cache")),
            output_dir: non_empty(&env_map, "OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            platform_fee_rate,
            request_spacing_ms,
            offline,
        })
    }

    /// Rate cache file for the configured currency.
    pub fn rate_cache_path(&self) -> Option<PathBuf> {
        self.target_currency
            .as_ref()
            .map(|c| self.cache_dir.join(format!("rates_{}.json", c)))
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.cache_dir.join("activity")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("EXPORT_PATH".to_string(), "/tmp/export.csv".to_string());
        map.insert("TOPSHOT_TOKEN".to_string(), "token".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.timezone, chrono_tz::UTC);
        assert_eq!(config.request_spacing_ms, 25);
        assert_eq!(
            config.platform_fee_rate,
            Decimal::from_str_canonical("0.05").unwrap()
        );
        assert_eq!(config.marketplace_api_url, DEFAULT_MARKETPLACE_URL);
        assert!(config.target_currency.is_none());
        assert!(config.rate_cache_path().is_none());
        assert!(!config.offline);
    }

    #[test]
    fn test_missing_export_path() {
        let mut env_map = setup_required_env();
        env_map.remove("EXPORT_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "EXPORT_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_token_optional_offline_but_identity_required() {
        let mut env_map = setup_required_env();
        env_map.remove("TOPSHOT_TOKEN");
        match Config::from_env_map(env_map.clone()) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "TOPSHOT_TOKEN"),
            _ => panic!("Expected MissingEnv error"),
        }

        env_map.insert("OFFLINE".to_string(), "true".to_string());
        match Config::from_env_map(env_map.clone()) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DAPPER_ID"),
            _ => panic!("Expected MissingEnv error"),
        }

        env_map.insert("DAPPER_ID".to_string(), "me".to_string());
        env_map.insert("FLOW_ADDRESS".to_string(), "0xabc".to_string());
        assert!(Config::from_env_map(env_map).unwrap().offline);
    }

    #[test]
    fn test_currency_requires_app_id() {
        let mut env_map = setup_required_env();
        env_map.insert("TARGET_CURRENCY".to_string(), "aud".to_string());
        match Config::from_env_map(env_map.clone()) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "RATES_APP_ID"),
            _ => panic!("Expected MissingEnv error"),
        }

        env_map.insert("RATES_APP_ID".to_string(), "app".to_string());
        env_map.insert("CACHE_DIR".to_string(), "/tmp/cache".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.target_currency.as_ref().unwrap().as_str(), "AUD");
        assert_eq!(
            config.rate_cache_path(),
            Some(PathBuf::from("/tmp/cache/rates_AUD.json"))
        );
    }

    #[test]
    fn test_invalid_timezone() {
        let mut env_map = setup_required_env();
        env_map.insert("TIMEZONE".to_string(), "Mars/Olympus".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TIMEZONE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_fee_rate() {
        for bad in ["1.5", "-0.1", "abc"] {
            let mut env_map = setup_required_env();
            env_map.insert("PLATFORM_FEE_RATE".to_string(), bad.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PLATFORM_FEE_RATE"),
                _ => panic!("Expected InvalidValue error for {}", bad),
            }
        }
    }

    #[test]
    fn test_invalid_offline_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("OFFLINE".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "OFFLINE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
