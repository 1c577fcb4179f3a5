//! Pipeline driver: export rows in, reconciled ledger out.
//!
//! Stage order: rates, feeds, matching, token lookups, synthesis, packs,
//! profit, forex, running balance. Only the export and the marketplace
//! activity feed are required; every other lookup degrades to an anomaly.

use crate::cache::{CachePort, SnapshotKey};
use crate::datasource::{MarketplaceSource, TrackerSource};
use crate::domain::{Decimal, ExternalActivity, LedgerRow, SecondaryActivity, UserId};
use crate::engine::{
    apply_forex, apply_running_balance, apportion, compute_profits, synthesize, ActivityMatcher,
    Anomaly, AnomalyReport, FeeSchedule, LotLedger, MatchState, TokenLookup,
};
use crate::error::AppError;
use crate::export::{read_export, write_outputs, OutputPaths};
use crate::orchestration::rates::RateOrchestrator;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACTIVITY_FEED: &str = "topshot";
const TRACKER_FEED: &str = "momentranks";

type ActivitySnapshots = Box<dyn CachePort<SnapshotKey, Vec<ExternalActivity>>>;
type TrackerSnapshots = Box<dyn CachePort<SnapshotKey, Vec<SecondaryActivity>>>;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub user: UserId,
    pub flow_address: String,
    pub fees: FeeSchedule,
    /// Serve feeds from snapshots only.
    pub offline: bool,
    /// Day the feed snapshots are filed under.
    pub snapshot_day: NaiveDate,
}

impl PipelineSettings {
    pub fn new(user: UserId, flow_address: String) -> Self {
        Self {
            user,
            flow_address,
            fees: FeeSchedule::default(),
            offline: false,
            snapshot_day: Utc::now().date_naive(),
        }
    }
}

/// Result of one reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// All rows, chronological, synthesized rows included.
    pub rows: Vec<LedgerRow>,
    pub anomalies: AnomalyReport,
    /// Deposit lots after the forex pass, when a currency was configured.
    pub lots: Option<LotLedger>,
    pub final_balance: Decimal,
}

pub struct Pipeline {
    marketplace: Arc<dyn MarketplaceSource>,
    tracker: Arc<dyn TrackerSource>,
    rates: Option<RateOrchestrator>,
    activity_snapshots: Option<ActivitySnapshots>,
    tracker_snapshots: Option<TrackerSnapshots>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        marketplace: Arc<dyn MarketplaceSource>,
        tracker: Arc<dyn TrackerSource>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            marketplace,
            tracker,
            rates: None,
            activity_snapshots: None,
            tracker_snapshots: None,
            settings,
        }
    }

    /// Enable currency conversion and forex realization.
    pub fn with_rates(mut self, rates: RateOrchestrator) -> Self {
        self.rates = Some(rates);
        self
    }

    pub fn with_snapshots(mut self, activity: ActivitySnapshots, tracker: TrackerSnapshots) -> Self {
        self.activity_snapshots = Some(activity);
        self.tracker_snapshots = Some(tracker);
        self
    }

    /// Read the export, reconcile it and write the ledger and anomaly report.
    pub async fn run(
        &mut self,
        export: &Path,
        zone: Tz,
        output_dir: &Path,
    ) -> Result<(Reconciliation, OutputPaths), AppError> {
        let imported =
            read_export(export, zone).map_err(|e| AppError::feed_unavailable("export", e))?;
        let reconciliation = self.reconcile(imported.rows).await?;
        let paths = write_outputs(
            output_dir,
            &reconciliation.rows,
            &reconciliation.anomalies,
            Utc::now(),
        )?;
        Ok((reconciliation, paths))
    }

    /// Run every stage over rows already sorted and numbered.
    pub async fn reconcile(&mut self, mut rows: Vec<LedgerRow>) -> Result<Reconciliation, AppError> {
        let mut anomalies = AnomalyReport::new();

        if let Some(rates) = self.rates.as_mut() {
            rates.attach_rates(&mut rows, &mut anomalies).await;
        }

        let primary = self.load_activity().await?;
        let secondary = self.load_tracker(&mut anomalies).await;
        info!(
            "Matching {} rows against {} activities and {} tracked sales",
            rows.len(),
            primary.len(),
            secondary.len()
        );

        let matcher = ActivityMatcher::new(
            &primary,
            &secondary,
            &self.settings.user,
            self.settings.fees,
        );
        let (mut rows, state) = matcher.run(rows, MatchState::new());
        let MatchState {
            mut packs,
            token_lookups,
            anomalies: match_anomalies,
            ..
        } = state;
        anomalies.extend(match_anomalies);

        self.resolve_tokens(&mut rows, &token_lookups, &mut anomalies).await;

        let next_id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let mut synthetic = synthesize(&primary, &rows, next_id);
        if !synthetic.is_empty() {
            if let Some(rates) = self.rates.as_mut() {
                rates.attach_rates(&mut synthetic, &mut anomalies).await;
            }
            let zone = rows.first().and_then(|r| r.selected_timezone.clone());
            for row in synthetic.iter_mut() {
                copy_zone(row, zone.as_deref());
            }
            rows.extend(synthetic);
            rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        }

        let pending: Vec<String> = packs
            .iter()
            .filter(|p| p.moment_ids.is_none())
            .map(|p| p.pack_id.clone())
            .collect();
        if !pending.is_empty() {
            match self.marketplace.fetch_pack_moments(&pending).await {
                Ok(contents) => {
                    for pack in contents {
                        packs.resolve(&pack.id, pack.moment_ids);
                    }
                }
                Err(e) => anomalies.push(Anomaly::OptionalLookupFailure {
                    lookup: format!("pack contents for {} packs", pending.len()),
                    detail: e.to_string(),
                }),
            }
        }
        let pack_costs = apportion(&packs, &mut anomalies);

        compute_profits(&mut rows, &pack_costs, &mut anomalies);

        let lots = if self.rates.is_some() {
            Some(apply_forex(&mut rows, &mut anomalies))
        } else {
            None
        };

        let final_balance = apply_running_balance(&mut rows);

        for (label, count) in anomalies.summary() {
            info!("{}: {}", label, count);
        }
        info!(
            "Reconciled {} rows, final balance {} USD, {} anomalies",
            rows.len(),
            final_balance.to_fixed2(),
            anomalies.len()
        );

        Ok(Reconciliation {
            rows,
            anomalies,
            lots,
            final_balance,
        })
    }

    async fn load_activity(&mut self) -> Result<Vec<ExternalActivity>, AppError> {
        let key = SnapshotKey::new(ACTIVITY_FEED, self.settings.snapshot_day);
        if let Some(cached) = self.activity_snapshots.as_ref().and_then(|s| s.get(&key)) {
            info!("Using activity snapshot {}", key.file_name());
            return Ok(cached);
        }
        if self.settings.offline {
            return Err(AppError::feed_unavailable(
                "marketplace activity",
                format!("offline and no snapshot {}", key.file_name()),
            ));
        }

        let activity = self
            .marketplace
            .fetch_activity()
            .await
            .map_err(|e| AppError::feed_unavailable("marketplace activity", e))?;
        if let Some(store) = self.activity_snapshots.as_mut() {
            if let Err(e) = store.put(key, activity.clone()) {
                warn!("Could not store activity snapshot: {}", e);
            }
        }
        Ok(activity)
    }

    async fn load_tracker(&mut self, anomalies: &mut AnomalyReport) -> Vec<SecondaryActivity> {
        if self.settings.flow_address.trim().is_empty() {
            debug!("No flow address; skipping tracker");
            return Vec::new();
        }
        let key = SnapshotKey::new(TRACKER_FEED, self.settings.snapshot_day);
        if let Some(cached) = self.tracker_snapshots.as_ref().and_then(|s| s.get(&key)) {
            info!("Using tracker snapshot {}", key.file_name());
            return cached;
        }
        if self.settings.offline {
            return Vec::new();
        }

        match self.tracker.fetch_transactions(&self.settings.flow_address).await {
            Ok(sales) => {
                if let Some(store) = self.tracker_snapshots.as_mut() {
                    if let Err(e) = store.put(key, sales.clone()) {
                        warn!("Could not store tracker snapshot: {}", e);
                    }
                }
                sales
            }
            Err(e) => {
                anomalies.push(Anomaly::OptionalLookupFailure {
                    lookup: "tracker transactions".to_string(),
                    detail: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    /// Fill marketplace moment ids on rows matched only through the tracker.
    async fn resolve_tokens(
        &self,
        rows: &mut [LedgerRow],
        lookups: &[TokenLookup],
        anomalies: &mut AnomalyReport,
    ) {
        for lookup in lookups {
            let Some(row) = rows.iter_mut().find(|r| r.id == lookup.row_id) else {
                continue;
            };
            match self.marketplace.find_moment_by_token(&lookup.token_id).await {
                Ok(Some(moment)) => {
                    let item = &mut row.item;
                    item.moment_id = Some(moment.id);
                    item.moment_play_id.get_or_insert(moment.play_id);
                    item.set_id.get_or_insert(moment.set_id);
                    if item.set_information.is_none() {
                        item.set_information = moment.set_visual_id;
                    }
                }
                Ok(None) => anomalies.push(Anomaly::OptionalLookupFailure {
                    lookup: format!("moment for token {}", lookup.token_id),
                    detail: "no minted moment found".to_string(),
                }),
                Err(e) => anomalies.push(Anomaly::OptionalLookupFailure {
                    lookup: format!("moment for token {}", lookup.token_id),
                    detail: e.to_string(),
                }),
            }
        }
    }
}

fn copy_zone(row: &mut LedgerRow, zone: Option<&str>) {
    let Some(name) = zone else {
        return;
    };
    let Ok(tz) = name.parse::<Tz>() else {
        return;
    };
    row.selected_timezone = Some(name.to_string());
    row.local_timestamp = Some(
        row.timestamp
            .with_timezone(&tz)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, false),
    );
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("marketplace", &self.marketplace)
            .field("tracker", &self.tracker)
            .field("rates", &self.rates)
            .field("settings", &self.settings)
            .finish()
    }
}
