use std::collections::HashMap;

use convmatch_engine::country::{CountryMap, RegionTable};
use convmatch_engine::model::{BrokerRow, CategoryRow, ConversionRow, PipelineInput};
use convmatch_engine::{run, PipelineConfig};

fn config(start_date: &str, tolerance_minutes: i64) -> PipelineConfig {
    PipelineConfig::from_toml(&format!(
        r#"
name = "integration"
start_date = "{start_date}"
time_tolerance_minutes = {tolerance_minutes}
"#
    ))
    .unwrap()
}

fn countries() -> CountryMap {
    let table = RegionTable::from_toml(
        r#"
[[regions]]
name = "Poland"
short_name = "pl"
aliases = ["Polska"]

[[regions]]
name = "Germany"
short_name = "de"
aliases = ["Deutschland"]
"#,
    )
    .unwrap();
    CountryMap::build(&table).unwrap()
}

fn conversion(created_at: &str, country: &str, category: &str) -> ConversionRow {
    ConversionRow {
        created_at: created_at.into(),
        country_name: country.into(),
        measurement_category: category.into(),
        raw_fields: HashMap::from([("campaign".to_string(), "spring".to_string())]),
    }
}

fn broker(timestamp: &str, country: &str, score: Option<&str>) -> BrokerRow {
    BrokerRow {
        timestamp: timestamp.into(),
        ip_country: country.into(),
        important_score: score.map(str::to_string),
        raw_fields: HashMap::new(),
    }
}

fn categories() -> Vec<CategoryRow> {
    vec![CategoryRow {
        measurement_category: "broker_review".into(),
        page_category: "review".into(),
    }]
}

// -------------------------------------------------------------------------
// Matching scenarios
// -------------------------------------------------------------------------

#[test]
fn poland_conversion_matches_epoch_visit() {
    // 1713787200 = 2024-04-22T12:00:00 UTC
    let input = PipelineInput {
        conversions: vec![conversion("2024-04-22 12:00:00", "Poland", "broker_review")],
        broker: vec![broker("1713787200", "Poland", Some("1"))],
        categories: categories(),
    };
    let out = run(&config("2024-04-21", 20), &countries(), input).unwrap();

    assert_eq!(out.matched.len(), 1);
    let record = &out.matched[0];
    assert!(record.was_matched);
    assert_eq!(
        record.broker_timestamp.unwrap().to_string(),
        "2024-04-22 12:00:00"
    );
    assert_eq!(record.conversion.country_name, "pl");
    assert_eq!(record.conversion.page_category.as_deref(), Some("review"));
    assert_eq!(record.broker.as_ref().unwrap().important_score, Some(1));
    assert_eq!(out.summary.matched, 1);
    assert_eq!(out.summary.unmatched, 0);
}

#[test]
fn unmapped_country_is_a_country_mismatch() {
    let input = PipelineInput {
        conversions: vec![conversion("2024-04-22 12:00:00", "Wakanda", "broker_review")],
        broker: vec![broker("1713787200", "Atlantis", Some("1"))],
        categories: categories(),
    };
    let out = run(&config("2024-04-01", 20), &countries(), input).unwrap();

    assert_eq!(out.matched.len(), 1);
    assert!(!out.matched[0].was_matched);
    assert_eq!(out.diagnostics.unmatched.len(), 1);
    assert!(!out.diagnostics.unmatched[0].country_match);
    assert_eq!(out.summary.country_mismatch, 1);
}

#[test]
fn twenty_five_minutes_away_misses_twenty_minute_tolerance() {
    // Broker visit at 12:25, conversion at 12:00, tolerance 20 min.
    let input = PipelineInput {
        conversions: vec![conversion("2024-04-22 12:00:00", "Poland", "broker_review")],
        broker: vec![broker("1713788700", "Poland", None)],
        categories: categories(),
    };
    let out = run(&config("2024-04-01", 20), &countries(), input).unwrap();

    let diag = &out.diagnostics.unmatched[0];
    assert!(!diag.record.was_matched);
    assert!(diag.country_match);
    // A single visit collapses the pl span to one instant, so the
    // conversion sits outside it.
    assert!(!diag.timestamp_within_tolerance);
    assert_eq!(out.summary.time_mismatch, 1);
}

#[test]
fn alias_resolution_joins_across_spellings() {
    let input = PipelineInput {
        conversions: vec![conversion("2024-04-22 12:00:00", "  POLSKA ", "broker_review")],
        broker: vec![broker("1713787200", "poland", None)],
        categories: categories(),
    };
    let out = run(&config("2024-04-01", 20), &countries(), input).unwrap();
    assert!(out.matched[0].was_matched);
}

// -------------------------------------------------------------------------
// Filtering + cardinality
// -------------------------------------------------------------------------

#[test]
fn filter_drops_early_and_unparseable_rows() {
    let input = PipelineInput {
        conversions: vec![
            conversion("2024-04-20 12:00:00", "Poland", "broker_review"),
            conversion("not a timestamp", "Poland", "broker_review"),
            conversion("2024-04-22 12:00:00", "Poland", "broker_review"),
        ],
        broker: vec![broker("1713787200", "Poland", None)],
        categories: categories(),
    };
    let out = run(&config("2024-04-21", 20), &countries(), input).unwrap();

    // One row matched, two dropped before matching; cardinality holds for
    // the filtered table.
    assert_eq!(out.matched.len(), 1);
    assert_eq!(out.summary.total, 1);
}

#[test]
fn left_cardinality_matches_filtered_conversions() {
    let input = PipelineInput {
        conversions: vec![
            conversion("2024-04-22 12:00:00", "Poland", "broker_review"),
            conversion("2024-04-22 13:00:00", "Germany", "broker_review"),
            conversion("2024-04-22 14:00:00", "Wakanda", "broker_review"),
        ],
        broker: vec![broker("1713787200", "Poland", None)],
        categories: categories(),
    };
    let out = run(&config("2024-04-01", 20), &countries(), input).unwrap();
    assert_eq!(out.matched.len(), 3);
    assert_eq!(out.summary.total, 3);
    assert_eq!(out.summary.matched + out.summary.unmatched, 3);
}

#[test]
fn zero_conversions_skips_ratio_without_error() {
    let input = PipelineInput {
        conversions: vec![],
        broker: vec![broker("1713787200", "Poland", None)],
        categories: categories(),
    };
    let out = run(&config("2024-04-01", 20), &countries(), input).unwrap();
    assert!(out.matched.is_empty());
    assert_eq!(out.summary.total, 0);
    assert_eq!(out.summary.matched, 0);
}

// -------------------------------------------------------------------------
// Determinism
// -------------------------------------------------------------------------

#[test]
fn rerun_produces_identical_matched_rows() {
    let build_input = || PipelineInput {
        conversions: vec![
            conversion("2024-04-22 12:29:00", "Poland", "broker_review"),
            conversion("2024-04-22 12:01:00", "Poland", "broker_review"),
            conversion("2024-04-22 12:10:00", "Deutschland", "broker_review"),
        ],
        broker: vec![
            broker("1713787200", "Poland", Some("1")),
            broker("1713789000", "Poland", Some("2")),
            broker("1713787800", "Germany", None),
        ],
        categories: categories(),
    };
    let cfg = config("2024-04-01", 20);
    let map = countries();

    let a = run(&cfg, &map, build_input()).unwrap();
    let b = run(&cfg, &map, build_input()).unwrap();

    let rows_a = serde_json::to_string(&a.matched).unwrap();
    let rows_b = serde_json::to_string(&b.matched).unwrap();
    assert_eq!(rows_a, rows_b);
}

#[test]
fn empty_country_map_still_joins_exact_spellings() {
    // Alias source failure degrades to pass-through: identical raw
    // spellings still match, different spellings do not.
    let input = PipelineInput {
        conversions: vec![
            conversion("2024-04-22 12:00:00", "Poland", "broker_review"),
            conversion("2024-04-22 12:00:00", "POLAND", "broker_review"),
        ],
        broker: vec![broker("1713787200", "Poland", None)],
        categories: categories(),
    };
    let out = run(&config("2024-04-01", 20), &CountryMap::empty(), input).unwrap();
    let matched: Vec<bool> = out.matched.iter().map(|r| r.was_matched).collect();
    assert_eq!(matched.iter().filter(|m| **m).count(), 1);
}
