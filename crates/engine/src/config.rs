use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::error::MatchError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    /// Conversions strictly before this date are dropped. Malformed values
    /// fail validation; the pipeline never starts on a bad threshold.
    pub start_date: String,
    #[serde(default = "default_tolerance_minutes")]
    pub time_tolerance_minutes: i64,
    /// Country alias table, relative to the config file. An unreadable or
    /// conflicting table degrades to pass-through normalization.
    #[serde(default = "default_regions_file")]
    pub regions_file: String,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_tolerance_minutes() -> i64 {
    20
}

fn default_regions_file() -> String {
    "regions.toml".into()
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_conversions_pattern")]
    pub conversions_pattern: String,
    #[serde(default = "default_semicolon")]
    pub conversions_delimiter: char,
    #[serde(default = "default_broker_file")]
    pub broker_file: String,
    #[serde(default = "default_comma")]
    pub broker_delimiter: char,
    #[serde(default = "default_category_file")]
    pub category_file: String,
    #[serde(default = "default_semicolon")]
    pub category_delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            conversions_pattern: default_conversions_pattern(),
            conversions_delimiter: default_semicolon(),
            broker_file: default_broker_file(),
            broker_delimiter: default_comma(),
            category_file: default_category_file(),
            category_delimiter: default_semicolon(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}

fn default_conversions_pattern() -> String {
    "conversions*.csv".into()
}

fn default_broker_file() -> String {
    "broker_data.csv".into()
}

fn default_category_file() -> String {
    "page_category_mapping.csv".into()
}

fn default_semicolon() -> char {
    ';'
}

fn default_comma() -> char {
    ','
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default = "default_matched_csv")]
    pub matched_csv: String,
    #[serde(default = "default_unmatched_csv")]
    pub unmatched_csv: String,
    #[serde(default = "default_country_mismatch_csv")]
    pub country_mismatch_csv: String,
    #[serde(default = "default_time_mismatch_csv")]
    pub time_mismatch_csv: String,
    #[serde(default = "default_summary_json")]
    pub summary_json: String,
    /// SQLite database file; omit to skip the SQLite sink.
    #[serde(default)]
    pub sqlite: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            matched_csv: default_matched_csv(),
            unmatched_csv: default_unmatched_csv(),
            country_mismatch_csv: default_country_mismatch_csv(),
            time_mismatch_csv: default_time_mismatch_csv(),
            summary_json: default_summary_json(),
            sqlite: None,
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}

fn default_matched_csv() -> String {
    "matched_data.csv".into()
}

fn default_unmatched_csv() -> String {
    "unmatched_conversions.csv".into()
}

fn default_country_mismatch_csv() -> String {
    "country_mismatch.csv".into()
}

fn default_time_mismatch_csv() -> String {
    "time_mismatch.csv".into()
}

fn default_summary_json() -> String {
    "summary.json".into()
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Matching parameters resolved from a validated config. The engine never
/// reads the process environment; everything arrives through this struct.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub start_date: NaiveDateTime,
    pub tolerance_minutes: i64,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, MatchError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| MatchError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        parse_start_date(&self.start_date)?;

        if self.time_tolerance_minutes < 0 {
            return Err(MatchError::ConfigValidation(format!(
                "time_tolerance_minutes must be non-negative, got {}",
                self.time_tolerance_minutes
            )));
        }

        if self.input.conversions_pattern.is_empty() {
            return Err(MatchError::ConfigValidation(
                "input.conversions_pattern must not be empty".into(),
            ));
        }

        for (field, delim) in [
            ("conversions_delimiter", self.input.conversions_delimiter),
            ("broker_delimiter", self.input.broker_delimiter),
            ("category_delimiter", self.input.category_delimiter),
        ] {
            if !delim.is_ascii() {
                return Err(MatchError::ConfigValidation(format!(
                    "input.{field} must be a single ASCII character, got '{delim}'"
                )));
            }
        }

        Ok(())
    }

    /// Resolved matching parameters; fails on the same conditions as
    /// [`PipelineConfig::validate`].
    pub fn match_settings(&self) -> Result<MatchSettings, MatchError> {
        Ok(MatchSettings {
            start_date: parse_start_date(&self.start_date)?,
            tolerance_minutes: self.time_tolerance_minutes,
        })
    }
}

/// Accepts a bare date (midnight) or a full datetime.
fn parse_start_date(value: &str) -> Result<NaiveDateTime, MatchError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(dt);
        }
    }
    Err(MatchError::StartDateParse { value: value.into() })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
