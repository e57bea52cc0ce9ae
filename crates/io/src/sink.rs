use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use tracing::info;

use convmatch_engine::model::{MatchedRecord, PipelineOutput, UnmatchedRecord};

use crate::error::IoError;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

const CORE_COLUMNS: &[&str] = &[
    "created_at",
    "country_name",
    "measurement_category",
    "page_category",
    "ip_country",
    "important_score",
    "broker_timestamp",
    "was_matched",
];

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn ensure_parent(path: &Path) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| IoError::Io(format!("{}: {e}", parent.display())))?;
    }
    Ok(())
}

/// Sorted union of passthrough column names across all records. Broker
/// passthrough columns are prefixed `broker_` in the output so they can
/// never collide with conversion columns.
fn passthrough_columns(records: &[&MatchedRecord]) -> (Vec<String>, Vec<String>) {
    let mut conversion_cols: BTreeSet<String> = BTreeSet::new();
    let mut broker_cols: BTreeSet<String> = BTreeSet::new();
    for r in records {
        conversion_cols.extend(r.conversion.raw_fields.keys().cloned());
        if let Some(broker) = &r.broker {
            broker_cols.extend(broker.raw_fields.keys().cloned());
        }
    }
    (
        conversion_cols.into_iter().collect(),
        broker_cols.into_iter().collect(),
    )
}

fn header_row(conversion_cols: &[String], broker_cols: &[String]) -> Vec<String> {
    let mut header: Vec<String> = CORE_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(conversion_cols.iter().cloned());
    header.extend(broker_cols.iter().map(|c| format!("broker_{c}")));
    header
}

fn record_row(
    record: &MatchedRecord,
    conversion_cols: &[String],
    broker_cols: &[String],
) -> Vec<String> {
    let c = &record.conversion;
    let mut row = vec![
        fmt_ts(&c.created_at),
        c.country_name.clone(),
        c.measurement_category.clone(),
        c.page_category.clone().unwrap_or_default(),
        record
            .broker
            .as_ref()
            .map(|b| b.ip_country.clone())
            .unwrap_or_default(),
        record
            .broker
            .as_ref()
            .and_then(|b| b.important_score)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        record.broker_timestamp.as_ref().map(fmt_ts).unwrap_or_default(),
        record.was_matched.to_string(),
    ];
    for col in conversion_cols {
        row.push(c.raw_fields.get(col).cloned().unwrap_or_default());
    }
    for col in broker_cols {
        row.push(
            record
                .broker
                .as_ref()
                .and_then(|b| b.raw_fields.get(col))
                .cloned()
                .unwrap_or_default(),
        );
    }
    row
}

// ---------------------------------------------------------------------------
// CSV sinks
// ---------------------------------------------------------------------------

pub fn write_matched_csv(records: &[MatchedRecord], path: &Path) -> Result<(), IoError> {
    ensure_parent(path)?;
    let refs: Vec<&MatchedRecord> = records.iter().collect();
    let (conversion_cols, broker_cols) = passthrough_columns(&refs);

    let mut writer =
        csv::Writer::from_path(path).map_err(|e| IoError::Csv(format!("{}: {e}", path.display())))?;
    writer
        .write_record(header_row(&conversion_cols, &broker_cols))
        .map_err(|e| IoError::Csv(e.to_string()))?;
    for record in records {
        writer
            .write_record(record_row(record, &conversion_cols, &broker_cols))
            .map_err(|e| IoError::Csv(e.to_string()))?;
    }
    writer.flush().map_err(|e| IoError::Io(e.to_string()))?;

    info!("wrote {} matched rows to {}", records.len(), path.display());
    Ok(())
}

/// Write a diagnostic subset: the matched columns plus the two
/// classification flags.
pub fn write_unmatched_csv(records: &[&UnmatchedRecord], path: &Path) -> Result<(), IoError> {
    ensure_parent(path)?;
    let refs: Vec<&MatchedRecord> = records.iter().map(|u| &u.record).collect();
    let (conversion_cols, broker_cols) = passthrough_columns(&refs);

    let mut writer =
        csv::Writer::from_path(path).map_err(|e| IoError::Csv(format!("{}: {e}", path.display())))?;
    let mut header = header_row(&conversion_cols, &broker_cols);
    header.push("country_match".into());
    header.push("timestamp_within_tolerance".into());
    writer
        .write_record(header)
        .map_err(|e| IoError::Csv(e.to_string()))?;

    for unmatched in records {
        let mut row = record_row(&unmatched.record, &conversion_cols, &broker_cols);
        row.push(unmatched.country_match.to_string());
        row.push(unmatched.timestamp_within_tolerance.to_string());
        writer.write_record(row).map_err(|e| IoError::Csv(e.to_string()))?;
    }
    writer.flush().map_err(|e| IoError::Io(e.to_string()))?;

    info!(
        "wrote {} unmatched rows to {}",
        records.len(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Summary JSON
// ---------------------------------------------------------------------------

pub fn write_summary_json(output: &PipelineOutput, path: &Path) -> Result<(), IoError> {
    ensure_parent(path)?;
    let report = serde_json::json!({
        "meta": output.meta,
        "summary": output.summary,
    });
    let json = serde_json::to_string_pretty(&report).map_err(|e| IoError::Io(e.to_string()))?;
    fs::write(path, json).map_err(|e| IoError::Io(format!("{}: {e}", path.display())))?;
    info!("wrote run summary to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// SQLite sink
// ---------------------------------------------------------------------------

/// Replace-table semantics: the previous run's table is dropped, matching
/// how a re-runnable daily batch overwrites its output.
pub fn write_sqlite(records: &[MatchedRecord], path: &Path) -> Result<(), IoError> {
    ensure_parent(path)?;
    let conn = Connection::open(path).map_err(|e| IoError::Sqlite(e.to_string()))?;

    conn.execute_batch(
        "DROP TABLE IF EXISTS matched_data;
         CREATE TABLE matched_data (
             created_at TEXT NOT NULL,
             country_name TEXT NOT NULL,
             measurement_category TEXT NOT NULL,
             page_category TEXT,
             ip_country TEXT,
             important_score INTEGER,
             broker_timestamp TEXT,
             was_matched INTEGER NOT NULL
         );",
    )
    .map_err(|e| IoError::Sqlite(e.to_string()))?;

    conn.execute("BEGIN TRANSACTION", [])
        .map_err(|e| IoError::Sqlite(e.to_string()))?;
    {
        let mut stmt = conn
            .prepare(
                "INSERT INTO matched_data (
                     created_at, country_name, measurement_category, page_category,
                     ip_country, important_score, broker_timestamp, was_matched
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(|e| IoError::Sqlite(e.to_string()))?;

        for record in records {
            let c = &record.conversion;
            stmt.execute(params![
                fmt_ts(&c.created_at),
                c.country_name,
                c.measurement_category,
                c.page_category,
                record.broker.as_ref().map(|b| b.ip_country.clone()),
                record.broker.as_ref().and_then(|b| b.important_score),
                record.broker_timestamp.as_ref().map(fmt_ts),
                record.was_matched as i64,
            ])
            .map_err(|e| IoError::Sqlite(e.to_string()))?;
        }
    }
    conn.execute("COMMIT", [])
        .map_err(|e| IoError::Sqlite(e.to_string()))?;

    info!(
        "wrote {} rows to SQLite table 'matched_data' at {}",
        records.len(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
