use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use convmatch_engine::config::InputConfig;
use convmatch_engine::model::{BrokerRow, CategoryRow, ConversionRow, PipelineInput};

use crate::error::IoError;

// ---------------------------------------------------------------------------
// Generic CSV reading
// ---------------------------------------------------------------------------

/// Read one CSV file into headers + string rows, skipping rows the parser
/// rejects or whose field count disagrees with the header.
fn read_table(path: &Path, delimiter: u8) -> Result<(Vec<String>, Vec<Vec<String>>), IoError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| IoError::Csv(format!("{}: {e}", path.display())))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IoError::Csv(format!("{}: {e}", path.display())))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        match record {
            Ok(r) if r.len() == headers.len() => {
                rows.push(r.iter().map(str::to_string).collect());
            }
            Ok(_) | Err(_) => skipped += 1,
        }
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    info!("loaded {} rows from {name}", rows.len());
    if skipped > 0 {
        warn!("skipped {skipped} malformed rows in {name}");
    }

    Ok((headers, rows))
}

fn required_idx(headers: &[String], table: &str, column: &str) -> Result<usize, IoError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| IoError::MissingColumn {
            table: table.into(),
            column: column.into(),
        })
}

/// Collect every column not claimed as a core field.
fn passthrough_fields(
    headers: &[String],
    row: &[String],
    core: &[usize],
) -> HashMap<String, String> {
    headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !core.contains(i))
        .map(|(i, h)| (h.clone(), row[i].clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Table loaders
// ---------------------------------------------------------------------------

pub fn load_conversions_file(path: &Path, delimiter: u8) -> Result<Vec<ConversionRow>, IoError> {
    let (headers, rows) = read_table(path, delimiter)?;
    let created_at = required_idx(&headers, "conversions", "created_at")?;
    let country = required_idx(&headers, "conversions", "country_name")?;
    let category = required_idx(&headers, "conversions", "measurement_category")?;
    let core = [created_at, country, category];

    Ok(rows
        .into_iter()
        .map(|row| ConversionRow {
            created_at: row[created_at].clone(),
            country_name: row[country].clone(),
            measurement_category: row[category].clone(),
            raw_fields: passthrough_fields(&headers, &row, &core),
        })
        .collect())
}

pub fn load_broker_file(path: &Path, delimiter: u8) -> Result<Vec<BrokerRow>, IoError> {
    let (headers, rows) = read_table(path, delimiter)?;
    let timestamp = required_idx(&headers, "broker data", "timestamp")?;
    let country = required_idx(&headers, "broker data", "ip_country")?;
    let score = headers.iter().position(|h| h == "important_score");

    let mut core = vec![timestamp, country];
    if let Some(idx) = score {
        core.push(idx);
    }

    Ok(rows
        .into_iter()
        .map(|row| BrokerRow {
            timestamp: row[timestamp].clone(),
            ip_country: row[country].clone(),
            important_score: score.map(|i| row[i].clone()),
            raw_fields: passthrough_fields(&headers, &row, &core),
        })
        .collect())
}

pub fn load_category_file(path: &Path, delimiter: u8) -> Result<Vec<CategoryRow>, IoError> {
    let (headers, rows) = read_table(path, delimiter)?;
    let category = required_idx(&headers, "category mapping", "measurement_category")?;
    let page = required_idx(&headers, "category mapping", "page_category")?;

    Ok(rows
        .into_iter()
        .map(|row| CategoryRow {
            measurement_category: row[category].clone(),
            page_category: row[page].clone(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Discovery + full input
// ---------------------------------------------------------------------------

/// Conversion files matching the pattern, sorted for deterministic
/// concatenation order.
pub fn discover_conversions(data_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, IoError> {
    let full_pattern = data_dir.join(pattern);
    let mut paths: Vec<PathBuf> = glob::glob(&full_pattern.to_string_lossy())
        .map_err(|e| IoError::Pattern(e.to_string()))?
        .filter_map(Result::ok)
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(IoError::NoInputFiles {
            pattern: pattern.into(),
            dir: data_dir.display().to_string(),
        });
    }
    Ok(paths)
}

/// Load all three input tables per the input config. `data_dir` is already
/// resolved relative to the config file.
pub fn load_input(data_dir: &Path, input: &InputConfig) -> Result<PipelineInput, IoError> {
    let mut conversions = Vec::new();
    for path in discover_conversions(data_dir, &input.conversions_pattern)? {
        conversions.extend(load_conversions_file(&path, input.conversions_delimiter as u8)?);
    }

    let broker = load_broker_file(
        &data_dir.join(&input.broker_file),
        input.broker_delimiter as u8,
    )?;
    let categories = load_category_file(
        &data_dir.join(&input.category_file),
        input.category_delimiter as u8,
    )?;

    Ok(PipelineInput {
        conversions,
        broker,
        categories,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_conversions_with_passthrough_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "conversions_a.csv",
            "created_at;country_name;measurement_category;campaign\n\
             2024-04-22 12:00:00;Poland;broker_review;spring\n",
        );
        let rows = load_conversions_file(&path, b';').unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].created_at, "2024-04-22 12:00:00");
        assert_eq!(rows[0].country_name, "Poland");
        assert_eq!(rows[0].raw_fields["campaign"], "spring");
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "conversions_a.csv",
            "created_at;country_name;measurement_category\n\
             2024-04-22 12:00:00;Poland;broker_review\n\
             too;few\n\
             2024-04-23 09:00:00;Germany;broker_review;extra;fields\n",
        );
        let rows = load_conversions_file(&path, b';').unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "broker_data.csv",
            "timestamp,visitor\n1713787200,abc\n",
        );
        let err = load_broker_file(&path, b',').unwrap_err();
        assert!(err.to_string().contains("ip_country"));
    }

    #[test]
    fn broker_score_column_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "broker_data.csv",
            "timestamp,ip_country\n1713787200,Poland\n",
        );
        let rows = load_broker_file(&path, b',').unwrap();
        assert_eq!(rows[0].important_score, None);

        let path = write(
            dir.path(),
            "broker_scored.csv",
            "timestamp,ip_country,important_score\n1713787200,Poland,4\n",
        );
        let rows = load_broker_file(&path, b',').unwrap();
        assert_eq!(rows[0].important_score.as_deref(), Some("4"));
    }

    #[test]
    fn discovery_sorts_and_requires_matches() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "conversions_b.csv", "x\n");
        write(dir.path(), "conversions_a.csv", "x\n");
        write(dir.path(), "broker_data.csv", "x\n");

        let paths = discover_conversions(dir.path(), "conversions*.csv").unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["conversions_a.csv", "conversions_b.csv"]);

        let err = discover_conversions(dir.path(), "nothing*.csv").unwrap_err();
        assert!(matches!(err, IoError::NoInputFiles { .. }));
    }

    #[test]
    fn load_input_concatenates_conversion_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "conversions_a.csv",
            "created_at;country_name;measurement_category\n\
             2024-04-22 12:00:00;Poland;broker_review\n",
        );
        write(
            dir.path(),
            "conversions_b.csv",
            "created_at;country_name;measurement_category\n\
             2024-04-23 09:00:00;Germany;broker_review\n",
        );
        write(
            dir.path(),
            "broker_data.csv",
            "timestamp,ip_country,important_score\n1713787200,Poland,1\n",
        );
        write(
            dir.path(),
            "page_category_mapping.csv",
            "measurement_category;page_category\nbroker_review;review\n",
        );

        let input = load_input(dir.path(), &InputConfig::default()).unwrap();
        assert_eq!(input.conversions.len(), 2);
        assert_eq!(input.conversions[0].country_name, "Poland");
        assert_eq!(input.broker.len(), 1);
        assert_eq!(input.categories.len(), 1);
    }
}
