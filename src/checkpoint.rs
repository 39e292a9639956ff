use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::CheckpointError;

/// Opaque "updated after" marker persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint(String);

impl Checkpoint {
    pub fn new(value: impl Into<String>) -> Self {
        Checkpoint(value.into().trim().to_string())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Checkpoint(at.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }

    /// The checkpoint as a timestamp, when it parses as RFC 3339.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `Err(CheckpointError::NotFound)` when nothing was ever saved; a blank
    /// checkpoint is a successful load.
    async fn load(&self) -> Result<Checkpoint, CheckpointError>;

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

/// Plain text state file holding a single timestamp.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Checkpoint, CheckpointError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Checkpoint::new(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CheckpointError::NotFound(
                self.path.display().to_string(),
            )),
            Err(e) => Err(CheckpointError::Unreadable(e)),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(CheckpointError::Unwritable)?;
        }

        // Write then rename so a crash never leaves a half-written file.
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, checkpoint.as_str())
            .await
            .map_err(CheckpointError::Unwritable)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(CheckpointError::Unwritable)?;

        tracing::info!(path = %self.path.display(), checkpoint = %checkpoint, "checkpoint saved");
        Ok(())
    }
}
