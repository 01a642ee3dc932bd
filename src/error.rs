//! Error taxonomy for sync operations.
//!
//! Every core operation either completes or fails with one of these signals.
//! The copy engine and the git adapter never swallow errors; only the binary
//! decides whether to display-and-continue.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while scanning, copying or talking to git
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("WoW installation path is not configured")]
    MissingInstallPath,

    #[error("Git repository URL is not configured")]
    MissingRepoUrl,

    #[error("Invalid git repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote repository error: {0}")]
    Remote(#[source] git2::Error),

    #[error("Git error: {0}")]
    Git(#[source] git2::Error),

    #[error("Push rejected by remote: {0}")]
    PushRejected(String),

    /// Pull needs a real merge and the merge left conflicting paths.
    #[error("Merge conflict between local and remote changes")]
    Conflict,

    #[error("No merge conflict is in progress")]
    NoConflictInProgress,

    #[error("Another sync operation is already running")]
    SyncInProgress,

    #[error("Sync task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Wrap an I/O error with the path it happened at.
    pub fn fs(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// True for the configuration class (detected before any I/O).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::MissingInstallPath
                | SyncError::MissingRepoUrl
                | SyncError::InvalidRepoUrl(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict)
    }
}

impl From<git2::Error> for SyncError {
    fn from(err: git2::Error) -> Self {
        if is_remote_error(&err) {
            SyncError::Remote(err)
        } else {
            SyncError::Git(err)
        }
    }
}

/// Network, transport and authentication failures are reported as remote errors.
pub(crate) fn is_remote_error(err: &git2::Error) -> bool {
    use git2::{ErrorClass, ErrorCode};

    err.code() == ErrorCode::Auth
        || err.code() == ErrorCode::Certificate
        || matches!(
            err.class(),
            ErrorClass::Net | ErrorClass::Ssh | ErrorClass::Http | ErrorClass::Ssl
        )
}

pub type Result<T> = std::result::Result<T, SyncError>;
