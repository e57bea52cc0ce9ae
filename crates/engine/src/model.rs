use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Ingested rows
// ---------------------------------------------------------------------------

/// A marketing conversion as ingested, timestamp still raw text.
/// Non-core source columns ride along in `raw_fields`.
#[derive(Debug, Clone)]
pub struct ConversionRow {
    pub created_at: String,
    pub country_name: String,
    pub measurement_category: String,
    pub raw_fields: HashMap<String, String>,
}

/// A broker visit-log row as ingested, epoch timestamp still raw text.
#[derive(Debug, Clone)]
pub struct BrokerRow {
    pub timestamp: String,
    pub ip_country: String,
    pub important_score: Option<String>,
    pub raw_fields: HashMap<String, String>,
}

/// One measurement-category → page-category mapping entry.
#[derive(Debug, Clone)]
pub struct CategoryRow {
    pub measurement_category: String,
    pub page_category: String,
}

/// Pre-loaded input tables handed to [`crate::engine::run`].
pub struct PipelineInput {
    pub conversions: Vec<ConversionRow>,
    pub broker: Vec<BrokerRow>,
    pub categories: Vec<CategoryRow>,
}

// ---------------------------------------------------------------------------
// Normalized rows
// ---------------------------------------------------------------------------

/// A conversion that survived the start-date filter: timestamp parsed,
/// country canonicalized, page category joined in.
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub created_at: NaiveDateTime,
    pub country_name: String,
    pub measurement_category: String,
    pub page_category: Option<String>,
    pub raw_fields: HashMap<String, String>,
}

/// A normalized broker visit. `country_name` duplicates the canonical
/// `ip_country` so both tables share the join-key name. A visit without a
/// parsed timestamp carries nothing to join on.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerVisit {
    pub broker_timestamp: Option<NaiveDateTime>,
    pub ip_country: String,
    pub country_name: String,
    pub important_score: Option<i64>,
    pub raw_fields: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Matching output
// ---------------------------------------------------------------------------

/// One output row per filtered conversion. `broker` is the nearest
/// same-country visit within tolerance, if any; a single visit may serve
/// several conversions.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedRecord {
    pub conversion: Conversion,
    pub broker: Option<BrokerVisit>,
    pub broker_timestamp: Option<NaiveDateTime>,
    pub was_matched: bool,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// An unmatched record tagged with the evidence for why it missed.
#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedRecord {
    pub record: MatchedRecord,
    /// The canonical country appears somewhere in the broker table.
    pub country_match: bool,
    /// Country matched AND the conversion falls inside that country's
    /// observed broker time span.
    pub timestamp_within_tolerance: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub unmatched: Vec<UnmatchedRecord>,
}

impl DiagnosticsReport {
    /// Unmatched rows whose country never shows up on the broker side.
    pub fn country_mismatches(&self) -> Vec<&UnmatchedRecord> {
        self.unmatched.iter().filter(|u| !u.country_match).collect()
    }

    /// Unmatched rows whose country is known but whose timestamp missed.
    pub fn time_mismatches(&self) -> Vec<&UnmatchedRecord> {
        self.unmatched
            .iter()
            .filter(|u| u.country_match && !u.timestamp_within_tolerance)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub country_mismatch: usize,
    pub time_mismatch: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub pipeline_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub start_date: String,
    pub tolerance_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub meta: RunMeta,
    pub summary: MatchSummary,
    pub matched: Vec<MatchedRecord>,
    pub diagnostics: DiagnosticsReport,
}
