use std::io;
use std::path::PathBuf;

use rusqlite::ffi;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be opened, or a read/write against it failed.
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),

    /// A store file exists but carries no schema. Callers may offer `init`.
    #[error("cache store {} is not initialized", .0.display())]
    StoreUninitialized(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    PathUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Two writers raced on the same key. Only happens when more than one
    /// coordinator writes to the same store.
    #[error("duplicate key: {0}")]
    DuplicateKeyConflict(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl CacheError {
    pub fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::PathUnreadable { path: path.into(), source }
    }

    /// The path an error is attributed to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::PathUnreadable { path, .. } | Self::StoreUninitialized(path) => Some(path.as_path()),
            _ => None,
        }
    }

    /// Rebuild a per-path failure so the same error can be reported for every
    /// occurrence of a path in a batch (`io::Error` is not `Clone`).
    pub(crate) fn duplicate_for_path(&self) -> Option<Self> {
        match self {
            Self::PathUnreadable { path, source } => Some(Self::PathUnreadable {
                path: path.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            }),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let message = message.clone().unwrap_or_else(|| err.to_string());
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                        Self::DuplicateKeyConflict(message)
                    }
                    _ => Self::ConstraintViolation(message),
                }
            }
            _ => Self::StoreUnavailable(err),
        }
    }
}
