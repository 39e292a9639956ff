use std::{error::Error, fmt};

use crate::http::HttpError;

#[derive(Debug)]
pub enum SourceError {
    Transport(HttpError),
    Api { status: u16, message: String },
    Protocol(serde_json::Error),
    PaginationLimitExceeded { pages: u32 },
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use SourceError::*;
        match self {
            Transport(e) => Some(e),
            Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SourceError::*;
        match self {
            Transport(_) => write!(f, "SourceUnavailable"),
            Api { status, message } => write!(f, "SourceApiError ({}): {}", status, message),
            Protocol(_) => write!(f, "SourceProtocolError"),
            PaginationLimitExceeded { pages } => {
                write!(f, "PaginationLimitExceeded: still paging after {} requests", pages)
            }
        }
    }
}

impl From<HttpError> for SourceError {
    fn from(error: HttpError) -> Self {
        SourceError::Transport(error)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        SourceError::Protocol(error)
    }
}

#[derive(Debug)]
pub enum SinkError {
    Transport(HttpError),
    Unavailable { status: u16 },
    Unauthorized { status: u16 },
    Rejected(String),
}

impl SinkError {
    /// Fatal errors end the run before the checkpoint moves.
    pub fn is_fatal(&self) -> bool {
        use SinkError::*;
        match self {
            Transport(_) | Unavailable { .. } | Unauthorized { .. } => true,
            Rejected(_) => false,
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use SinkError::*;
        match self {
            Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SinkError::*;
        match self {
            Transport(_) => write!(f, "SinkUnavailable: transport failure"),
            Unavailable { status } => write!(f, "SinkUnavailable: status {}", status),
            Unauthorized { status } => write!(f, "SinkUnauthorized: status {}", status),
            Rejected(s) => write!(f, "SinkRejected: {}", s),
        }
    }
}

impl From<HttpError> for SinkError {
    fn from(error: HttpError) -> Self {
        SinkError::Transport(error)
    }
}

#[derive(Debug)]
pub enum CheckpointError {
    NotFound(String),
    Unreadable(std::io::Error),
    Unwritable(std::io::Error),
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use CheckpointError::*;
        match self {
            Unreadable(e) | Unwritable(e) => Some(e),
            NotFound(_) => None,
        }
    }
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CheckpointError::*;
        match self {
            NotFound(path) => write!(f, "CheckpointMissing: {}", path),
            Unreadable(_) => write!(f, "CheckpointUnreadable"),
            Unwritable(_) => write!(f, "CheckpointUnwritable"),
        }
    }
}

/// Errors that abort a sync run. None of them leave a new checkpoint behind.
#[derive(Debug)]
pub enum SyncError {
    MissingCheckpoint(CheckpointError),
    Checkpoint(CheckpointError),
    Source(SourceError),
    Sink { title: String, error: SinkError },
    Save(CheckpointError),
}

impl SyncError {
    pub fn phase(&self) -> crate::sync::Phase {
        use crate::sync::Phase;
        use SyncError::*;
        match self {
            MissingCheckpoint(_) | Checkpoint(_) => Phase::CheckpointLoaded,
            Source(_) => Phase::Fetching,
            Sink { .. } => Phase::Processing,
            Save(_) => Phase::Checkpointing,
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use SyncError::*;
        match self {
            MissingCheckpoint(e) | Checkpoint(e) | Save(e) => Some(e),
            Source(e) => Some(e),
            Sink { error, .. } => Some(error),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SyncError::*;
        match self {
            MissingCheckpoint(e) => {
                write!(f, "no checkpoint and bootstrap policy is abort: {}", e)
            }
            Checkpoint(e) => write!(f, "failed to load checkpoint: {}", crate::unpack_error(e)),
            Source(e) => write!(f, "failed to fetch documents: {}", crate::unpack_error(e)),
            Sink { title, error } => write!(f, "sink failed on {:?}: {}", title, error),
            Save(e) => write!(f, "failed to save checkpoint: {}", crate::unpack_error(e)),
        }
    }
}

impl From<SourceError> for SyncError {
    fn from(error: SourceError) -> Self {
        SyncError::Source(error)
    }
}
