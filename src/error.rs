use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid review period '{0}' (expected e.g. 1d, 2w, 1m)")]
    InvalidPeriod(String),

    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("{field} must be between 1 and 5, got {value}")]
    InvalidRating { field: &'static str, value: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("no session '{0}' in the current cycle")]
    UnknownSession(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("unsupported export format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },
}
