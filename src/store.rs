//! Persisted list of completed sessions.
//!
//! The list lives in a single JSON file named after the storage key and is
//! only ever appended to. A missing or corrupt file reads as an empty list;
//! a file that exists but cannot be read is left alone on save.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::session::SessionRecord;

pub const STATS_KEY: &str = "breathing-stats";

pub trait SessionStore {
    /// All records in the order they were appended.
    fn load(&self) -> Vec<SessionRecord>;

    fn append(&mut self, record: &SessionRecord) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/breathe/breathing-stats.json`, or the working directory if
    /// the platform has no data dir.
    pub fn open_default() -> Self {
        let file_name = format!("{STATS_KEY}.json");
        let path = match dirs::data_dir() {
            Some(dir) => dir.join("breathe").join(file_name),
            None => PathBuf::from(file_name),
        };
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JsonFileStore {
    /// Existing history for a rewrite. Missing or malformed history reads as
    /// empty; a file that exists but cannot be read is an error so it is not
    /// overwritten.
    fn read_existing(&self) -> Result<Vec<SessionRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No session history yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(
                path = %self.path.display(),
                "Ignoring malformed session history, it will be replaced on next save: {e}"
            );
            Vec::new()
        }))
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Vec<SessionRecord> {
        self.read_existing().unwrap_or_else(|e| {
            warn!("Could not read session history: {e}");
            Vec::new()
        })
    }

    fn append(&mut self, record: &SessionRecord) -> Result<()> {
        let mut records = self.read_existing()?;
        records.push(record.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let json = serde_json::to_string(&records)?;
        fs::write(&self.path, json).map_err(|e| Error::io(&self.path, e))?;

        debug!(path = %self.path.display(), count = records.len(), "Saved session record");
        Ok(())
    }
}

/// Totals for the `stats` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub sessions: usize,
    pub total_minutes: u64,
    pub last: Option<DateTime<Utc>>,
}

impl Summary {
    pub fn of(records: &[SessionRecord]) -> Self {
        Self {
            sessions: records.len(),
            total_minutes: records.iter().map(|r| u64::from(r.duration)).sum(),
            last: records.iter().map(|r| r.date).max(),
        }
    }
}

/// In-memory store; nothing outlives the process.
impl SessionStore for Vec<SessionRecord> {
    fn load(&self) -> Vec<SessionRecord> {
        self.clone()
    }

    fn append(&mut self, record: &SessionRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}
