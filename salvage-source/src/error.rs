//! Error types for salvage-source.

use std::path::PathBuf;

use thiserror::Error;

use salvage_core::ConfigError;

/// Every way stack enumeration can fail. All of them are fatal for a run.
#[derive(Debug, Error)]
pub enum SourceError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stacks directory {path} does not exist or is not a directory")]
    DirectoryMissing { path: PathBuf },

    #[error("no stacks found in {origin}")]
    Empty { origin: String },

    #[error("stack '{name}' is defined twice ({first} and {second})")]
    DuplicateStack {
        name: String,
        first: String,
        second: String,
    },

    /// Credentials were rejected by the orchestration API.
    #[error("authentication rejected by {url} (HTTP {status}): {message}")]
    Auth {
        url: String,
        status: u16,
        message: String,
    },

    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("unexpected HTTP {status} from {url}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("could not set up TLS: {message}")]
    Tls { message: String },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("source misconfigured: {0}")]
    Config(#[from] ConfigError),
}

impl SourceError {
    /// `true` when the failure is a credential rejection.
    pub fn is_auth(&self) -> bool {
        matches!(self, SourceError::Auth { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
