//! Export ingestion.
//!
//! Columns are taken by position; the header text varies between export
//! versions and is ignored.

use super::ExportError;
use crate::domain::{parse_instant, Decimal, LedgerRow, PaymentMethod, RowStatus};
use chrono::SecondsFormat;
use chrono_tz::Tz;
use csv::StringRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

pub const INPUT_COLUMNS: [&str; 8] = [
    "activity",
    "date",
    "subtotal_usd",
    "fee_usd",
    "total_usd",
    "payment_method",
    "payment_id",
    "status",
];

/// Rows from other product lines share the export but not this ledger.
fn is_foreign_product(activity: &str) -> bool {
    activity.contains("Gaia sale")
        || activity
            .find("NFL ALL DAY")
            .map(|at| activity.len() > at + "NFL ALL DAY".len())
            .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct ImportedExport {
    /// Sorted by timestamp and numbered from 1.
    pub rows: Vec<LedgerRow>,
    pub cancelled: usize,
    pub foreign: usize,
}

fn parse_amount(raw: &str, column: &str, line: u64) -> Result<Decimal, ExportError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '$' && *c != ',').collect();
    if cleaned.is_empty() {
        return Ok(Decimal::zero());
    }
    Decimal::from_str_canonical(&cleaned).map_err(|e| ExportError::InvalidRow {
        line,
        message: format!("invalid {} {:?}: {}", column, raw, e),
    })
}

fn parse_record(record: &StringRecord, line: u64) -> Result<LedgerRow, ExportError> {
    if record.len() < INPUT_COLUMNS.len() {
        return Err(ExportError::InvalidRow {
            line,
            message: format!(
                "expected {} columns, found {}",
                INPUT_COLUMNS.len(),
                record.len()
            ),
        });
    }
    let field = |i: usize| record.get(i).unwrap_or("").trim();

    let timestamp = parse_instant(field(1)).ok_or_else(|| ExportError::InvalidRow {
        line,
        message: format!("invalid date {:?}", field(1)),
    })?;

    Ok(LedgerRow::new(
        field(0).to_string(),
        timestamp,
        RowStatus::parse(field(7)),
        PaymentMethod::parse(field(5)),
        field(6).to_string(),
        parse_amount(field(2), INPUT_COLUMNS[2], line)?,
        parse_amount(field(3), INPUT_COLUMNS[3], line)?,
        parse_amount(field(4), INPUT_COLUMNS[4], line)?,
    ))
}

/// Parse an export, drop cancelled and foreign rows, sort and number the rest.
pub fn parse_export<R: Read>(input: R, zone: Tz) -> Result<ImportedExport, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut rows = Vec::new();
    let mut cancelled = 0;
    let mut foreign = 0;

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(index as u64 + 2);
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row = parse_record(&record, line)?;
        if is_foreign_product(&row.activity) {
            foreign += 1;
            continue;
        }
        if row.status == RowStatus::Cancelled {
            cancelled += 1;
            continue;
        }
        rows.push(row);
    }

    rows.sort_by_key(|r| r.timestamp);
    for (i, row) in rows.iter_mut().enumerate() {
        row.id = i as u64 + 1;
        row.selected_timezone = Some(zone.name().to_string());
        row.local_timestamp = Some(
            row.timestamp
                .with_timezone(&zone)
                .to_rfc3339_opts(SecondsFormat::Millis, false),
        );
    }

    debug!(
        "Parsed export: {} rows kept, {} cancelled, {} other products",
        rows.len(),
        cancelled,
        foreign
    );
    Ok(ImportedExport {
        rows,
        cancelled,
        foreign,
    })
}

pub fn read_export(path: &Path, zone: Tz) -> Result<ImportedExport, ExportError> {
    let file = File::open(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let imported = parse_export(file, zone)?;
    info!(
        "Loaded {} rows from {} (dropped {} cancelled)",
        imported.rows.len(),
        path.display(),
        imported.cancelled
    );
    Ok(imported)
}
