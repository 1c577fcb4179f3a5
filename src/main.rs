use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use momentledger::cache::{JsonFileCache, SnapshotDir};
use momentledger::datasource::{
    MarketplaceClient, MarketplaceSource, OpenExchangeRatesClient, RequestScheduler, TrackerClient,
};
use momentledger::domain::Decimal;
use momentledger::engine::FeeSchedule;
use momentledger::orchestration::RateOrchestrator;
use momentledger::{Config, Pipeline, PipelineSettings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "momentledger", version, about = "Reconcile a Top Shot account export")]
struct Cli {
    /// Export CSV (overrides EXPORT_PATH)
    #[arg(long)]
    export: Option<PathBuf>,

    /// IANA zone for the local date column (overrides TIMEZONE)
    #[arg(long)]
    timezone: Option<String>,

    /// Secondary currency, e.g. AUD (overrides TARGET_CURRENCY)
    #[arg(long)]
    currency: Option<String>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Use cached feed snapshots only
    #[arg(long)]
    offline: bool,
}

impl Cli {
    fn apply(&self, env_map: &mut HashMap<String, String>) {
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                env_map.insert(key.to_string(), value);
            }
        };
        set("EXPORT_PATH", self.export.as_ref().map(|p| p.display().to_string()));
        set("TIMEZONE", self.timezone.clone());
        set("TARGET_CURRENCY", self.currency.clone());
        set("OUTPUT_DIR", self.output_dir.as_ref().map(|p| p.display().to_string()));
        set("CACHE_DIR", self.cache_dir.as_ref().map(|p| p.display().to_string()));
        if self.offline {
            set("OFFLINE", Some("true".to_string()));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut env_map: HashMap<String, String> = std::env::vars().collect();
    cli.apply(&mut env_map);
    let config = Config::from_env_map(env_map).context("loading configuration")?;

    let scheduler = Arc::new(RequestScheduler::new(Duration::from_millis(
        config.request_spacing_ms,
    )));
    let marketplace = Arc::new(MarketplaceClient::new(
        config.marketplace_api_url.clone(),
        config.topshot_token.clone().unwrap_or_default(),
        scheduler.clone(),
    ));
    let tracker = Arc::new(TrackerClient::new(
        config.tracker_api_url.clone(),
        scheduler.clone(),
    ));

    let (user, flow_address) = match (config.dapper_id.clone(), config.flow_address.clone()) {
        (Some(user), Some(address)) => (user, address),
        (user, address) => {
            let profile = marketplace
                .fetch_profile()
                .await
                .context("resolving DAPPER_ID / FLOW_ADDRESS from the marketplace profile")?;
            tracing::info!(
                "Using profile {} ({})",
                profile.dapper_id,
                profile.flow_address
            );
            (
                user.unwrap_or(profile.dapper_id),
                address.unwrap_or(profile.flow_address),
            )
        }
    };

    let mut settings = PipelineSettings::new(user, flow_address);
    settings.fees = FeeSchedule::new(config.platform_fee_rate);
    settings.offline = config.offline;
    settings.snapshot_day = Utc::now().date_naive();

    let mut pipeline = Pipeline::new(marketplace, tracker, settings).with_snapshots(
        Box::new(SnapshotDir::new(config.snapshot_dir())),
        Box::new(SnapshotDir::new(config.snapshot_dir())),
    );

    if let (Some(currency), Some(path)) = (config.target_currency.clone(), config.rate_cache_path())
    {
        let source = Arc::new(OpenExchangeRatesClient::new(
            config.rates_api_url.clone(),
            config.rates_app_id.clone().unwrap_or_default(),
            scheduler.clone(),
        ));
        let cache = JsonFileCache::<NaiveDate, Decimal>::open(path);
        pipeline = pipeline.with_rates(RateOrchestrator::new(source, Box::new(cache), currency));
    }

    let (reconciliation, paths) = pipeline
        .run(&config.export_path, config.timezone, &config.output_dir)
        .await
        .context("reconciling export")?;

    tracing::info!(
        "Done: {} rows, {} anomalies, ledger at {}",
        reconciliation.rows.len(),
        reconciliation.anomalies.len(),
        paths.ledger.display()
    );
    Ok(())
}
