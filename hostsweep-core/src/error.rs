use hostsweep_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnumError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Scanner error: {0}")]
    Scan(#[from] ScanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid domain format: {0}")]
    InvalidDomain(String),

    #[error("Wordlist not found: {0}")]
    WordlistNotFound(i64),

    #[error("Wordlist {id} is a {found} list, expected {expected}")]
    WordlistType {
        id: i64,
        found: String,
        expected: String,
    },

    #[error("Invalid wordlist: {0}")]
    InvalidWordlist(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("no wordlist available")]
    NoWordlist,

    #[error("HTTP enumeration is disabled (set ENABLE_HTTP_ENUM=true)")]
    Disabled,
}

pub type Result<T> = std::result::Result<T, EnumError>;
