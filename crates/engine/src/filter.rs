use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::model::ConversionRow;

/// Timestamp formats accepted for conversion `created_at` values.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a conversion timestamp, or `None` when the value is malformed.
/// Callers decide the fallback; the filter drops the row.
pub fn parse_datetime_opt(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Keep rows whose timestamp parses and lands at or after `start_date`.
/// Unparseable timestamps drop the row.
pub fn filter_conversions(
    rows: Vec<ConversionRow>,
    start_date: NaiveDateTime,
) -> Vec<(NaiveDateTime, ConversionRow)> {
    let before = rows.len();
    let kept: Vec<(NaiveDateTime, ConversionRow)> = rows
        .into_iter()
        .filter_map(|row| parse_datetime_opt(&row.created_at).map(|ts| (ts, row)))
        .filter(|(ts, _)| *ts >= start_date)
        .collect();
    debug!("start-date filter kept {}/{} conversion rows", kept.len(), before);
    kept
}
