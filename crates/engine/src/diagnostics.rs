use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::model::{
    BrokerVisit, DiagnosticsReport, MatchSummary, MatchedRecord, UnmatchedRecord,
};

/// Classify unmatched records and compute the run summary.
///
/// `country_match` checks the whole broker table, including visits whose
/// timestamps failed to parse; `timestamp_within_tolerance` checks the
/// conversion against the [min, max] span of that country's parsed
/// timestamps.
pub fn report(matched: &[MatchedRecord], broker: &[BrokerVisit]) -> (DiagnosticsReport, MatchSummary) {
    let known_countries: HashSet<&str> =
        broker.iter().map(|v| v.country_name.as_str()).collect();

    let mut spans: HashMap<&str, (i64, i64)> = HashMap::new();
    for visit in broker {
        if let Some(ts) = visit.broker_timestamp {
            let ts = ts.and_utc().timestamp();
            spans
                .entry(visit.country_name.as_str())
                .and_modify(|span| {
                    span.0 = span.0.min(ts);
                    span.1 = span.1.max(ts);
                })
                .or_insert((ts, ts));
        }
    }

    let mut unmatched = Vec::new();
    for record in matched.iter().filter(|r| !r.was_matched) {
        let country = record.conversion.country_name.as_str();
        let country_match = known_countries.contains(country);
        let ts = record.conversion.created_at.and_utc().timestamp();
        let timestamp_within_tolerance = country_match
            && spans
                .get(country)
                .is_some_and(|&(min, max)| ts >= min && ts <= max);

        unmatched.push(UnmatchedRecord {
            record: record.clone(),
            country_match,
            timestamp_within_tolerance,
        });
    }

    let total = matched.len();
    let matched_count = total - unmatched.len();
    if total > 0 {
        info!(
            "matched {matched_count}/{total} conversions ({:.1}%)",
            100.0 * matched_count as f64 / total as f64
        );
    } else {
        warn!("no conversions to match, skipping match-rate computation");
    }

    let summary = MatchSummary {
        total,
        matched: matched_count,
        unmatched: unmatched.len(),
        country_mismatch: unmatched.iter().filter(|u| !u.country_match).count(),
        time_mismatch: unmatched
            .iter()
            .filter(|u| u.country_match && !u.timestamp_within_tolerance)
            .count(),
    };

    (DiagnosticsReport { unmatched }, summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
