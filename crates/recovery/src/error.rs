use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Recovery store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Recovery record {path} is not valid JSON: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Recovery record for ticket {ticket} has an unreadable timestamp: {value}")]
    InvalidTimestamp { ticket: u64, value: String },
}
