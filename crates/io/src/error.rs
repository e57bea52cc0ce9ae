use std::fmt;

#[derive(Debug)]
pub enum IoError {
    /// No conversion files matched the configured pattern.
    NoInputFiles { pattern: String, dir: String },
    /// Required column missing from an input file.
    MissingColumn { table: String, column: String },
    /// Invalid glob pattern.
    Pattern(String),
    /// CSV read/write error.
    Csv(String),
    /// SQLite error.
    Sqlite(String),
    /// Filesystem error.
    Io(String),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInputFiles { pattern, dir } => {
                write!(f, "no input files matching '{pattern}' found in {dir}")
            }
            Self::MissingColumn { table, column } => {
                write!(f, "{table}: missing required column '{column}'")
            }
            Self::Pattern(msg) => write!(f, "invalid file pattern: {msg}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Sqlite(msg) => write!(f, "SQLite error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for IoError {}
