//! End-to-end runs of the pipeline over mocked feeds.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use momentledger::cache::MemoryCache;
use momentledger::datasource::MockDataSource;
use momentledger::domain::{
    ActivityKind, ActivityType, CurrencyCode, Decimal, ExternalActivity, FeedStatus, LedgerRow,
    MatchSource, MomentDetails, MomentId, PackRef, PaymentMethod, RowStatus, Subject, UserId,
};
use momentledger::export::OUTPUT_COLUMNS;
use momentledger::orchestration::RateOrchestrator;
use momentledger::{AppError, Pipeline, PipelineSettings};
use std::str::FromStr;
use std::sync::Arc;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, day, hour, 0, 0).unwrap()
}

fn settings() -> PipelineSettings {
    let mut settings = PipelineSettings::new(UserId::new("me".to_string()), String::new());
    settings.snapshot_day = NaiveDate::from_ymd_opt(2021, 3, 31).unwrap();
    settings
}

fn moment(id: &str, serial: u64) -> MomentDetails {
    MomentDetails {
        id: MomentId::new(id.to_string()),
        play_id: "play-7".to_string(),
        player_name: "LaMelo Ball".to_string(),
        play_category: "Assist".to_string(),
        set_id: "set-2".to_string(),
        set_visual_id: Some("SET_VISUAL_COMMON".to_string()),
        serial_number: Some(serial),
        tier: None,
    }
}

fn activity(id: &str, activity_type: ActivityType, when: DateTime<Utc>, subject: Subject) -> ExternalActivity {
    ExternalActivity {
        id: id.to_string(),
        activity_type,
        status: FeedStatus::Success,
        created_at: when,
        updated_at: when,
        subject,
    }
}

fn pack_feed() -> MockDataSource {
    let pack_ids: Vec<MomentId> = (1..=4).map(|i| MomentId::new(format!("m-{}", i))).collect();
    MockDataSource::new()
        .with_activity(activity(
            "act-pack",
            ActivityType::PurchasePack,
            at(1, 10),
            Subject::PackOrder {
                id: "order-pack".to_string(),
                price: dec("20"),
                quantity: Some(1),
                listing_title: "Base Set Pack".to_string(),
                listing_price: Some(dec("20")),
                packs: vec![PackRef {
                    id: "pack-1".to_string(),
                    moment_ids: Vec::new(),
                }],
            },
        ))
        .with_activity(activity(
            "act-gift",
            ActivityType::MomentTransferRequest,
            at(5, 8),
            Subject::Transfer {
                id: "transfer-1".to_string(),
                counterparty: Some(UserId::new("friend".to_string())),
                moment: moment("m-3", 33),
            },
        ))
        .with_activity(activity(
            "act-sale",
            ActivityType::P2pMomentListingSold,
            at(10, 9),
            Subject::Order {
                id: "order-sale".to_string(),
                price: dec("12.63"),
                moment: moment("m-2", 22),
            },
        ))
        .with_pack(PackRef {
            id: "pack-1".to_string(),
            moment_ids: pack_ids,
        })
}

const PACK_EXPORT: &str = "\
Activity,Date,Subtotal (USD),Fee (USD),Total (USD),Payment Method,Payment ID,Status
NBA Top Shot sale,2021-03-10T09:00:00Z,12.00,0,12.00,Dapper Balance,pay-sale,SUCCEEDED
NBA Top Shot purchase,2021-03-01T10:00:00Z,20.00,0,20.00,Dapper Balance,pay-pack,SUCCEEDED
NBA Top Shot purchase,2021-03-02T10:00:00Z,7.00,0,7.00,Dapper Balance,pay-x,CANCELLED
";

#[tokio::test]
async fn test_pack_sale_profit_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("export.csv");
    std::fs::write(&export, PACK_EXPORT).unwrap();
    let output_dir = dir.path().join("out");

    let mock = Arc::new(pack_feed());
    let mut pipeline = Pipeline::new(mock.clone(), mock.clone(), settings());
    let (result, paths) = pipeline
        .run(&export, chrono_tz::UTC, &output_dir)
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 3);
    assert!(result.anomalies.is_empty(), "{:?}", result.anomalies);

    let pack = &result.rows[0];
    assert_eq!(pack.activity_kind, ActivityKind::PackPurchase);
    assert_eq!(pack.item.set_or_pack_ids().as_deref(), Some("pack-1"));
    assert_eq!(pack.sale_fee_usd, Some(Decimal::zero()));

    let gift = &result.rows[1];
    assert_eq!(gift.activity_kind, ActivityKind::GiftSent);
    assert_eq!(gift.id, 3);
    assert_eq!(gift.matched_activity_id(), Some("act-gift"));
    assert_eq!(gift.item.counterparty_id, Some(UserId::new("friend".to_string())));
    assert_eq!(gift.account_balance_usd, Some(dec("-20")));

    let sale = &result.rows[2];
    assert_eq!(sale.match_source(), MatchSource::Primary);
    assert_eq!(sale.sale_profit_usd, Some(dec("7")));
    assert_eq!(sale.days_held, Some(9));
    assert_eq!(sale.from_pack_id.as_deref(), Some("pack-1"));
    assert_eq!(sale.sale_fee_usd, Some(dec("0.63")));
    assert_eq!(result.final_balance, dec("-8"));
    assert!(result.lots.is_none());

    let mut reader = csv::Reader::from_path(&paths.ledger).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.len(), 8 + OUTPUT_COLUMNS.len());
    assert_eq!(reader.records().count(), 3);
    assert!(paths.anomalies.exists());
}

#[tokio::test]
async fn test_unresolved_lookups_degrade_to_anomalies() {
    let mock = Arc::new(pack_feed().failing_lookups());
    let mut pipeline = Pipeline::new(mock.clone(), mock.clone(), settings());

    let mut rows = vec![
        LedgerRow::new(
            "NBA Top Shot purchase".to_string(),
            at(1, 10),
            RowStatus::Succeeded,
            PaymentMethod::DapperBalance,
            "pay-pack".to_string(),
            dec("20"),
            Decimal::zero(),
            dec("20"),
        ),
        LedgerRow::new(
            "NBA Top Shot sale".to_string(),
            at(10, 9),
            RowStatus::Succeeded,
            PaymentMethod::DapperBalance,
            "pay-sale".to_string(),
            dec("12"),
            Decimal::zero(),
            dec("12"),
        ),
        LedgerRow::new(
            "NBA Top Shot purchase".to_string(),
            at(12, 9),
            RowStatus::Succeeded,
            PaymentMethod::DapperBalance,
            "pay-orphan".to_string(),
            dec("99"),
            Decimal::zero(),
            dec("99"),
        ),
    ];
    for (i, row) in rows.iter_mut().enumerate() {
        row.id = i as u64 + 1;
    }

    let result = pipeline.reconcile(rows).await.unwrap();
    assert_eq!(result.anomalies.count("OptionalLookupFailure"), 1);
    assert_eq!(result.anomalies.count("PackWithoutMoments"), 1);
    assert_eq!(result.anomalies.count("UnresolvedSaleOrigin"), 1);
    assert_eq!(result.anomalies.unmatched_row_ids(), vec![3]);

    let sale = result.rows.iter().find(|r| r.payment_id == "pay-sale").unwrap();
    assert!(sale.sale_profit_usd.is_none());
}

#[tokio::test]
async fn test_missing_export_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockDataSource::new());
    let mut pipeline = Pipeline::new(mock.clone(), mock, settings());
    let err = pipeline
        .run(&dir.path().join("missing.csv"), chrono_tz::UTC, dir.path())
        .await
        .unwrap_err();
    match err {
        AppError::RequiredFeedUnavailable { feed, .. } => assert_eq!(feed, "export"),
        other => panic!("unexpected error {:?}", other),
    }
}

fn balance_row(activity: &str, when: DateTime<Utc>, total: &str, payment_id: &str) -> LedgerRow {
    LedgerRow::new(
        activity.to_string(),
        when,
        RowStatus::Succeeded,
        PaymentMethod::DapperBalance,
        payment_id.to_string(),
        dec(total),
        Decimal::zero(),
        dec(total),
    )
}

#[tokio::test]
async fn test_fifo_forex_through_pipeline() {
    let jan = |d: u32| Utc.with_ymd_and_hms(2021, 1, d, 12, 0, 0).unwrap();
    let day = |d: u32| NaiveDate::from_ymd_opt(2021, 1, d).unwrap();
    let mock = MockDataSource::new()
        .with_rate(day(1), "AUD", dec("1.40"))
        .with_rate(day(5), "AUD", dec("1.45"))
        .with_rate(day(10), "AUD", dec("1.375"));
    let shared = Arc::new(mock.clone());

    let rates = RateOrchestrator::new(
        shared.clone(),
        Box::new(MemoryCache::<NaiveDate, Decimal>::new()),
        CurrencyCode::parse("AUD").unwrap(),
    );
    let mut pipeline = Pipeline::new(shared.clone(), shared, settings()).with_rates(rates);

    let mut rows = vec![
        balance_row("Dapper receive", jan(1), "100", "dep-a"),
        balance_row("Dapper receive", jan(5), "50", "dep-b"),
        balance_row("Dapper withdrawal", jan(10), "120", "wd-1"),
    ];
    for (i, row) in rows.iter_mut().enumerate() {
        row.id = i as u64 + 1;
    }

    let result = pipeline.reconcile(rows).await.unwrap();
    assert!(result.anomalies.is_empty(), "{:?}", result.anomalies);
    assert_eq!(mock.rate_calls(), 3);

    let withdrawal = &result.rows[2];
    let realization = withdrawal.forex_realization.as_ref().unwrap();
    assert_eq!(realization.currency_withdrawal, dec("165"));
    assert_eq!(realization.currency_equivalent_cost, dec("169"));
    assert_eq!(realization.forex_gain, dec("-4"));
    assert_eq!(realization.deposits_used(), vec!["dep-a", "dep-b"]);

    let lots = result.lots.unwrap();
    assert_eq!(lots.remaining(), dec("30"));
    assert_eq!(result.final_balance, dec("30"));
    assert_eq!(withdrawal.account_balance_secondary, Some(dec("41.25")));
}
