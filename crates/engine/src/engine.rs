use tracing::info;

use crate::config::PipelineConfig;
use crate::country::CountryMap;
use crate::diagnostics;
use crate::error::MatchError;
use crate::filter::filter_conversions;
use crate::matcher::match_conversions;
use crate::model::{PipelineInput, PipelineOutput, RunMeta};
use crate::normalize::{build_category_map, normalize_broker, normalize_conversions};

/// Run the full pipeline: filter → normalize → match → diagnose.
///
/// Single-threaded over bounded in-memory tables; re-running with the same
/// inputs and config produces the same matched rows.
pub fn run(
    config: &PipelineConfig,
    countries: &CountryMap,
    input: PipelineInput,
) -> Result<PipelineOutput, MatchError> {
    let settings = config.match_settings()?;

    let filtered = filter_conversions(input.conversions, settings.start_date);
    let categories = build_category_map(&input.categories);
    let conversions = normalize_conversions(filtered, countries, &categories);
    let broker = normalize_broker(input.broker, countries);

    info!(
        "matching {} conversions against {} broker visits (tolerance {} min)",
        conversions.len(),
        broker.len(),
        settings.tolerance_minutes
    );
    let matched = match_conversions(conversions, &broker, settings.tolerance_minutes);
    let (diagnostics, summary) = diagnostics::report(&matched, &broker);

    Ok(PipelineOutput {
        meta: RunMeta {
            pipeline_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            start_date: settings.start_date.to_string(),
            tolerance_minutes: settings.tolerance_minutes,
        },
        summary,
        matched,
        diagnostics,
    })
}
