//! `convmatch-engine` — conversion/broker-visit matching engine.
//!
//! Pure engine crate: receives pre-loaded records, returns the matched
//! table plus unmatched diagnostics. No CLI or file I/O.

pub mod config;
pub mod country;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod filter;
pub mod matcher;
pub mod model;
pub mod normalize;

pub use config::{MatchSettings, PipelineConfig};
pub use country::{CountryMap, RegionTable};
pub use engine::run;
pub use error::MatchError;
pub use model::{PipelineInput, PipelineOutput};
