use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use tracing::debug;

use crate::country::CountryMap;
use crate::model::{BrokerRow, BrokerVisit, CategoryRow, Conversion, ConversionRow};

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// Interpret raw epoch text as unix seconds. Fractional values truncate;
/// anything non-numeric is `None` and the visit stays unmatchable.
pub fn parse_epoch_opt(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let secs = if let Ok(n) = value.parse::<i64>() {
        n
    } else {
        match value.parse::<f64>() {
            Ok(f) if f.is_finite() => f.trunc() as i64,
            _ => return None,
        }
    };
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

/// Integer coercion for importance scores; non-numeric is `None`.
pub fn parse_score_opt(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Category mapping
// ---------------------------------------------------------------------------

/// Build the measurement-category → page-category lookup. The table is
/// unique-keyed upstream; on a duplicate the later entry wins.
pub fn build_category_map(rows: &[CategoryRow]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for row in rows {
        if map
            .insert(row.measurement_category.clone(), row.page_category.clone())
            .is_some()
        {
            debug!(
                "duplicate measurement_category '{}' in mapping, keeping the later entry",
                row.measurement_category
            );
        }
    }
    map
}

// ---------------------------------------------------------------------------
// Table normalization
// ---------------------------------------------------------------------------

/// Canonicalize countries on filtered conversions and join page categories.
/// Unmapped categories become `None`, never an error.
pub fn normalize_conversions(
    rows: Vec<(NaiveDateTime, ConversionRow)>,
    countries: &CountryMap,
    categories: &HashMap<String, String>,
) -> Vec<Conversion> {
    let mut conversions: Vec<Conversion> = rows
        .into_iter()
        .map(|(created_at, row)| {
            let page_category = categories.get(&row.measurement_category).cloned();
            Conversion {
                created_at,
                country_name: row.country_name,
                measurement_category: row.measurement_category,
                page_category,
                raw_fields: row.raw_fields,
            }
        })
        .collect();

    countries.normalize("conversions", conversions.iter_mut().map(|c| &mut c.country_name));
    conversions
}

/// Canonicalize broker countries, derive the epoch timestamp, and coerce
/// scores. The canonical `ip_country` is copied into `country_name` so both
/// tables share the join-key name.
pub fn normalize_broker(rows: Vec<BrokerRow>, countries: &CountryMap) -> Vec<BrokerVisit> {
    let mut visits: Vec<BrokerVisit> = rows
        .into_iter()
        .map(|row| BrokerVisit {
            broker_timestamp: parse_epoch_opt(&row.timestamp),
            ip_country: row.ip_country,
            country_name: String::new(),
            important_score: row.important_score.as_deref().and_then(parse_score_opt),
            raw_fields: row.raw_fields,
        })
        .collect();

    countries.normalize("broker visits", visits.iter_mut().map(|v| &mut v.ip_country));
    for visit in &mut visits {
        visit.country_name = visit.ip_country.clone();
    }
    visits
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
