//! Ledger table output: the export's columns followed by the reconciled ones.

use super::reader::INPUT_COLUMNS;
use super::ExportError;
use crate::domain::{iso_millis, Decimal, LedgerRow, MatchSource};
use crate::engine::AnomalyReport;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const OUTPUT_COLUMNS: [&str; 36] = [
    "id",
    "dapper_sale_fee_usd",
    "dapper_sale_fee_to_currency",
    "other_currency",
    "usd_to_currency_rate",
    "total_currency",
    "json_data_id",
    "item",
    "player",
    "play_category",
    "team",
    "flow_token_id",
    "other_party_to_transactionId",
    "other_party_to_transaction",
    "main_data_source",
    "order_id",
    "moment_play_id",
    "set_or_pack_ids",
    "serial_number",
    "activity_details",
    "set_information",
    "is_pack",
    "pack_quantity",
    "moment_general_path",
    "moment_serial_path",
    "moment_id",
    "sale_profit_usd",
    "sale_profit_currency",
    "from_pack_id",
    "days_held",
    "account_balance",
    "account_balance_currency",
    "forex_realisation",
    "forex_gain",
    "selected_timezone",
    "date_in_selected_timezone",
];

/// `<yyyymmdd>_<unix-ms>_output.csv`
pub fn output_file_name(now: DateTime<Utc>) -> String {
    format!("{}_{}_output.csv", now.format("%Y%m%d"), now.timestamp_millis())
}

fn money(value: Option<Decimal>) -> String {
    value.map(|v| v.to_canonical_string()).unwrap_or_default()
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn record_for(row: &LedgerRow) -> Result<Vec<String>, ExportError> {
    let item = &row.item;
    let forex_json = match &row.forex_realization {
        Some(realization) => serde_json::to_string(realization)?,
        None => String::new(),
    };
    let json_data_id = match row.match_source() {
        MatchSource::Primary => text(row.matched_activity_id()),
        _ => String::new(),
    };

    let mut record = vec![
        row.activity.clone(),
        iso_millis(&row.timestamp),
        row.subtotal_usd.to_canonical_string(),
        row.fee_usd.to_canonical_string(),
        row.total_usd.to_canonical_string(),
        row.payment_method.as_export_str().to_string(),
        row.payment_id.clone(),
        row.status.as_export_str().to_string(),
    ];
    record.extend([
        row.id.to_string(),
        money(row.sale_fee_usd),
        money(row.sale_fee_usd.and_then(|fee| row.to_secondary(fee))),
        row.currency.as_ref().map(|c| c.to_string()).unwrap_or_default(),
        money(row.secondary_currency_rate),
        money(row.total_secondary().map(|t| t.round2())),
        json_data_id,
        text(item.item.as_deref()),
        text(item.player.as_deref()),
        text(item.play_category.as_deref()),
        text(item.team.as_deref()),
        text(item.flow_token_id.as_deref()),
        text(item.counterparty_id.as_ref().map(|id| id.as_str())),
        text(item.counterparty_name.as_deref()),
        row.match_source().output_label().to_string(),
        text(item.order_id.as_deref()),
        text(item.moment_play_id.as_deref()),
        item.set_or_pack_ids().unwrap_or_default(),
        item.serial_number.map(|s| s.to_string()).unwrap_or_default(),
        row.activity_details
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        text(item.set_information.as_deref()),
        if item.is_pack { "true".to_string() } else { String::new() },
        if item.is_pack {
            item.pack_quantity.to_string()
        } else {
            String::new()
        },
        item.general_path().unwrap_or_default(),
        item.serial_path().unwrap_or_default(),
        text(item.moment_id.as_ref().map(|id| id.as_str())),
        money(row.sale_profit_usd),
        money(row.sale_profit_secondary),
        text(row.from_pack_id.as_deref()),
        row.days_held.map(|d| d.to_string()).unwrap_or_default(),
        money(row.account_balance_usd),
        money(row.account_balance_secondary),
        forex_json,
        money(row.forex_realization.as_ref().map(|f| f.forex_gain)),
        text(row.selected_timezone.as_deref()),
        text(row.local_timestamp.as_deref()),
    ]);
    Ok(record)
}

/// Write the header and one record per row.
pub fn write_ledger<W: Write>(out: W, rows: &[LedgerRow]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(INPUT_COLUMNS.iter().chain(OUTPUT_COLUMNS.iter()))?;
    for row in rows {
        writer.write_record(record_for(row)?)?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: "<ledger>".to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub ledger: PathBuf,
    pub anomalies: PathBuf,
}

/// Write the ledger CSV and `anomalies.json` into `dir`.
pub fn write_outputs(
    dir: &Path,
    rows: &[LedgerRow],
    anomalies: &AnomalyReport,
    now: DateTime<Utc>,
) -> Result<OutputPaths, ExportError> {
    let io_err = |path: &Path, source| ExportError::Io {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let ledger = dir.join(output_file_name(now));
    let file = File::create(&ledger).map_err(|e| io_err(&ledger, e))?;
    write_ledger(file, rows)?;

    let anomalies_path = dir.join("anomalies.json");
    let json = serde_json::to_vec_pretty(anomalies)?;
    fs::write(&anomalies_path, json).map_err(|e| io_err(&anomalies_path, e))?;

    info!(
        "Wrote {} rows to {} and {} anomalies to {}",
        rows.len(),
        ledger.display(),
        anomalies.len(),
        anomalies_path.display()
    );
    Ok(OutputPaths {
        ledger,
        anomalies: anomalies_path,
    })
}
