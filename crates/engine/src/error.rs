use std::fmt;

#[derive(Debug)]
pub enum MatchError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad tolerance, bad delimiter, etc.).
    ConfigValidation(String),
    /// Start date cannot be parsed; fatal before any row is processed.
    StartDateParse { value: String },
    /// Two region entries register the same alias under different codes.
    RegionConflict { alias: String, existing: String, conflicting: String },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::StartDateParse { value } => {
                write!(f, "invalid start_date '{value}' (expected YYYY-MM-DD)")
            }
            Self::RegionConflict { alias, existing, conflicting } => {
                write!(
                    f,
                    "alias '{alias}' registered to both '{existing}' and '{conflicting}'"
                )
            }
        }
    }
}

impl std::error::Error for MatchError {}
