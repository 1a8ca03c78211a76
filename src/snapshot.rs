//! Persisted copy of the thread
//!
//! The on-disk format is a JSON array of `{role, content, durationSeconds}`
//! records, plus `createdAt` and the hand-off flag when known. Loading never
//! touches the live store; the caller hands the parsed messages to the
//! exchange only once the whole file is valid.

use crate::thread::{Message, MessageRecord, RoleError};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid record {index}: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: RoleError,
    },
}

/// Load/save contract for the persisted thread
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Message>, SnapshotError>;

    /// Returns the modification time of what was written, when the store has one
    async fn save(&self, messages: &[Message]) -> Result<Option<SystemTime>, SnapshotError>;
}

/// Parse a snapshot document into finalized messages
pub fn parse_snapshot(bytes: &[u8]) -> Result<Vec<Message>, SnapshotError> {
    let records: Vec<MessageRecord> = serde_json::from_slice(bytes)?;
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            record
                .into_message()
                .map_err(|source| SnapshotError::InvalidRecord { index, source })
        })
        .collect()
}

pub fn render_snapshot(messages: &[Message]) -> Result<Vec<u8>, SnapshotError> {
    let records: Vec<MessageRecord> = messages.iter().map(MessageRecord::from).collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

/// Snapshot kept in a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshot {
    /// A missing file is an empty thread
    async fn load(&self) -> Result<Vec<Message>, SnapshotError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No snapshot file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        parse_snapshot(&bytes)
    }

    /// Write to a sibling temp file and rename it into place
    async fn save(&self, messages: &[Message]) -> Result<Option<SystemTime>, SnapshotError> {
        let bytes = render_snapshot(messages)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        let modified = match tokio::fs::metadata(&self.path).await.and_then(|m| m.modified()) {
            Ok(modified) => Some(modified),
            Err(e) => {
                tracing::debug!(error = %e, "Saved snapshot has no modification time");
                None
            }
        };

        tracing::debug!(path = %self.path.display(), count = messages.len(), "Snapshot saved");
        Ok(modified)
    }
}
