use crate::error::RecoveryError;
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What is remembered about one confirmed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub ticket: u64,
    pub comment: String,
    pub lots: Decimal,
    /// The open time exactly as the broker reported it.
    pub open_time: String,
    /// The reconstructed local open instant, RFC 3339 with offset.
    pub open_time_extended: String,
}

impl RecoveryRecord {
    pub fn new(ticket: u64, comment: &str, lots: Decimal, open_time: &str, extended: DateTime<FixedOffset>) -> Self {
        Self {
            ticket,
            comment: comment.to_string(),
            lots,
            open_time: open_time.to_string(),
            open_time_extended: extended.to_rfc3339(),
        }
    }

    pub fn executed_open_time(&self) -> Result<DateTime<FixedOffset>, RecoveryError> {
        DateTime::parse_from_rfc3339(&self.open_time_extended).map_err(|_| RecoveryError::InvalidTimestamp {
            ticket: self.ticket,
            value: self.open_time_extended.clone(),
        })
    }
}

/// File-backed store of [`RecoveryRecord`]s.
#[derive(Debug, Clone)]
pub struct RecoveryRepository {
    dir: PathBuf,
}

impl RecoveryRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ticket: u64) -> PathBuf {
        self.dir.join(format!("{}_cassandra.json", ticket))
    }

    /// Returns `Ok(None)` when no record was ever written for `ticket`.
    pub fn load(&self, ticket: u64) -> Result<Option<RecoveryRecord>, RecoveryError> {
        let path = self.path_for(ticket);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RecoveryError::Io { path, source }),
        };
        let record = serde_json::from_str(&raw).map_err(|source| RecoveryError::Serialization { path, source })?;
        Ok(Some(record))
    }

    /// Writes (or overwrites) the record for its ticket, creating the directory if needed.
    pub fn save(&self, record: &RecoveryRecord) -> Result<(), RecoveryError> {
        fs::create_dir_all(&self.dir).map_err(|source| RecoveryError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(record.ticket);
        let body = serde_json::to_string_pretty(record).map_err(|source| RecoveryError::Serialization {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body).map_err(|source| RecoveryError::Io { path: path.clone(), source })?;

        tracing::debug!(ticket = record.ticket, path = %path.display(), "Recovery record saved");
        Ok(())
    }
}
