use std::collections::HashMap;

use crate::model::{BrokerVisit, Conversion, MatchedRecord};

/// Left-join each conversion to the nearest same-country broker visit
/// within `tolerance_minutes`: exactly one output row per conversion, and
/// a single visit may serve several conversions. Conversions are sorted by
/// timestamp ascending; ties on distance break toward the earlier visit.
pub fn match_conversions(
    mut conversions: Vec<Conversion>,
    broker: &[BrokerVisit],
    tolerance_minutes: i64,
) -> Vec<MatchedRecord> {
    conversions.sort_by_key(|c| c.created_at);
    let tolerance_secs = tolerance_minutes * 60;

    // Per-country timelines sorted ascending, so each lookup is a binary
    // search instead of a scan over the whole broker table.
    let mut timelines: HashMap<&str, Vec<(i64, usize)>> = HashMap::new();
    for (idx, visit) in broker.iter().enumerate() {
        if let Some(ts) = visit.broker_timestamp {
            timelines
                .entry(visit.country_name.as_str())
                .or_default()
                .push((ts.and_utc().timestamp(), idx));
        }
    }
    for timeline in timelines.values_mut() {
        timeline.sort_unstable();
    }

    conversions
        .into_iter()
        .map(|conversion| {
            let target = conversion.created_at.and_utc().timestamp();
            let hit = timelines
                .get(conversion.country_name.as_str())
                .and_then(|timeline| nearest_within(timeline, target, tolerance_secs));

            match hit {
                Some(idx) => {
                    let visit = broker[idx].clone();
                    MatchedRecord {
                        conversion,
                        broker_timestamp: visit.broker_timestamp,
                        broker: Some(visit),
                        was_matched: true,
                    }
                }
                None => MatchedRecord {
                    conversion,
                    broker: None,
                    broker_timestamp: None,
                    was_matched: false,
                },
            }
        })
        .collect()
}

/// Nearest timeline entry to `target` within `tolerance_secs` (inclusive).
/// An exact distance tie prefers the earlier timestamp.
fn nearest_within(timeline: &[(i64, usize)], target: i64, tolerance_secs: i64) -> Option<usize> {
    let pos = timeline.partition_point(|&(ts, _)| ts < target);
    let earlier = pos.checked_sub(1).map(|i| timeline[i]);
    let later = timeline.get(pos).copied();

    let (ts, idx) = match (earlier, later) {
        (Some(e), Some(l)) => {
            if target - e.0 <= l.0 - target {
                e
            } else {
                l
            }
        }
        (Some(e), None) => e,
        (None, Some(l)) => l,
        (None, None) => return None,
    };

    if (ts - target).abs() <= tolerance_secs {
        Some(idx)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
