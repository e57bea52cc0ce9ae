//! `convmatch run` / `convmatch validate` — config-driven pipeline execution.

use std::path::{Path, PathBuf};

use tracing::warn;

use convmatch_engine::country::{CountryMap, RegionTable};
use convmatch_engine::model::UnmatchedRecord;
use convmatch_engine::PipelineConfig;
use convmatch_io::{ingest, sink, IoError};

use crate::exit_codes::{
    EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_NO_INPUT, EXIT_RUNTIME, EXIT_USAGE,
};
use crate::CliError;

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let (config, base_dir) = load_config(&config_path)?;
    let countries = load_country_map(&base_dir, &config.regions_file);

    let data_dir = base_dir.join(&config.input.data_dir);
    let input = ingest::load_input(&data_dir, &config.input).map_err(ingest_error)?;

    let result = convmatch_engine::run(&config, &countries, input)
        .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;

    // Sinks: matched table, the three diagnostic subsets, run summary.
    let out_dir = base_dir.join(&config.output.dir);
    sink::write_matched_csv(&result.matched, &out_dir.join(&config.output.matched_csv))
        .map_err(sink_error)?;

    let diag = &result.diagnostics;
    let all: Vec<&UnmatchedRecord> = diag.unmatched.iter().collect();
    sink::write_unmatched_csv(&all, &out_dir.join(&config.output.unmatched_csv))
        .map_err(sink_error)?;
    sink::write_unmatched_csv(
        &diag.country_mismatches(),
        &out_dir.join(&config.output.country_mismatch_csv),
    )
    .map_err(sink_error)?;
    sink::write_unmatched_csv(
        &diag.time_mismatches(),
        &out_dir.join(&config.output.time_mismatch_csv),
    )
    .map_err(sink_error)?;

    if let Some(ref db_file) = config.output.sqlite {
        sink::write_sqlite(&result.matched, &out_dir.join(db_file)).map_err(sink_error)?;
    }
    sink::write_summary_json(&result, &out_dir.join(&config.output.summary_json))
        .map_err(sink_error)?;

    let report = serde_json::json!({
        "meta": result.meta,
        "summary": result.summary,
    });
    if let Some(ref path) = output_file {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    if json_output {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
        println!("{json}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{}: {} conversions — {} matched, {} unmatched ({} country mismatches, {} time mismatches)",
        config.name, s.total, s.matched, s.unmatched, s.country_mismatch, s.time_mismatch,
    );

    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let (config, base_dir) = load_config(&config_path)?;
    let countries = load_country_map(&base_dir, &config.regions_file);

    eprintln!(
        "{}: config valid — start date {}, tolerance {} min, {} country aliases",
        config.name,
        config.start_date,
        config.time_tolerance_minutes,
        countries.len(),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Loading helpers
// ---------------------------------------------------------------------------

fn load_config(config_path: &Path) -> Result<(PipelineConfig, PathBuf), CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::new(
            EXIT_USAGE,
            format!("cannot read {}: {e}", config_path.display()),
        )
    })?;
    let config = PipelineConfig::from_toml(&config_str)
        .map_err(|e| CliError::new(EXIT_INVALID_CONFIG, e.to_string()))?;

    let base_dir = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok((config, base_dir))
}

/// Country alias loading is recoverable by contract: an unreadable,
/// unparseable, or conflicting table degrades to pass-through
/// normalization with a warning instead of aborting the run.
fn load_country_map(base_dir: &Path, regions_file: &str) -> CountryMap {
    let path = base_dir.join(regions_file);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!("could not load country mapping from {}: {e}", path.display());
            return CountryMap::empty();
        }
    };
    let table = match RegionTable::from_toml(&content) {
        Ok(table) => table,
        Err(e) => {
            warn!("could not parse country mapping {}: {e}", path.display());
            return CountryMap::empty();
        }
    };
    match CountryMap::build(&table) {
        Ok(map) => map,
        Err(e) => {
            warn!("could not build country mapping: {e}");
            CountryMap::empty()
        }
    }
}

fn ingest_error(err: IoError) -> CliError {
    match err {
        IoError::NoInputFiles { .. } => CliError::new(EXIT_NO_INPUT, err.to_string())
            .with_hint("check input.data_dir and input.conversions_pattern"),
        _ => CliError::new(EXIT_RUNTIME, err.to_string()),
    }
}

fn sink_error(err: IoError) -> CliError {
    CliError::new(EXIT_ERROR, err.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
