//! Error types for salvage-sync.

use thiserror::Error;

use salvage_core::ConfigError;
use salvage_source::SourceError;

/// Failures of a single remote repository call.
///
/// "File not found" is not an error; [`get_file`](crate::RemoteRepository::get_file)
/// returns `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Optimistic-concurrency rejection: the file changed since it was read,
    /// or a create raced with another writer.
    #[error("conflict writing {path}: {message}")]
    Conflict { path: String, message: String },

    /// The token was rejected.
    #[error("authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("unexpected HTTP {status} from {url}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("repository {repository} not found or not accessible")]
    RepositoryNotFound { repository: String },

    #[error("repository {repository} is not private; refusing to commit stack files")]
    NotPrivate { repository: String },

    #[error("{path} is a directory, not a file")]
    NotAFile { path: String },

    #[error("invalid API URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("repository misconfigured: {0}")]
    Config(#[from] ConfigError),
}

impl RepoError {
    pub fn is_auth(&self) -> bool {
        matches!(self, RepoError::Auth { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepoError::Conflict { .. })
    }
}

/// Run-level failures. Any of these aborts the run with a non-zero exit.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Stacks could not be enumerated.
    #[error("stack source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),

    /// Credentials rejected by the orchestration API or the repository.
    #[error("{service} authentication failed: {message}")]
    Auth { service: &'static str, message: String },

    /// A repository failure outside the per-stack isolation boundary.
    #[error("repository error: {0}")]
    Repository(#[source] RepoError),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth { .. })
    }
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        if err.is_auth() {
            SyncError::Auth {
                service: "stack source",
                message: err.to_string(),
            }
        } else {
            SyncError::SourceUnavailable(err)
        }
    }
}

impl From<RepoError> for SyncError {
    fn from(err: RepoError) -> Self {
        if err.is_auth() {
            SyncError::Auth {
                service: "repository",
                message: err.to_string(),
            }
        } else {
            SyncError::Repository(err)
        }
    }
}
