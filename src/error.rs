//! Error types for the disk cache.

use std::fmt;
use std::sync::Arc;

/// Failure reported through a completion callback or a `Completion::Ready`.
///
/// `NotFound` and `Failed` are the two statuses callers branch on; the
/// remaining variants refine `Failed` with a reason.
#[derive(Debug, Clone)]
pub enum CacheError {
    /// No entry exists for the key (or it is known to be going away).
    NotFound,
    /// Generic operation failure.
    Failed,
    /// `create_entry` was called with an empty key.
    EmptyKey,
    /// The cache directory could not be brought into a usable state.
    InitFailed(String),
    /// The backend was torn down before the operation completed.
    Aborted,
    /// A file operation on the worker pool failed.
    Io(Arc<std::io::Error>),
}

impl CacheError {
    /// True for results that let an iterator move on to the next hash.
    pub(crate) fn is_skippable(&self) -> bool {
        matches!(self, CacheError::NotFound | CacheError::Failed)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotFound => write!(f, "Entry not found"),
            CacheError::Failed => write!(f, "Operation failed"),
            CacheError::EmptyKey => write!(f, "Entry key must not be empty"),
            CacheError::InitFailed(msg) => write!(f, "Cache initialization failed: {}", msg),
            CacheError::Aborted => write!(f, "Backend shut down before completion"),
            CacheError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            CacheError::NotFound
        } else {
            CacheError::Io(Arc::new(err))
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
