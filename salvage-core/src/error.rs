//! Error types for salvage-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating [`Settings`](crate::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading a config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A config file was requested explicitly but does not exist.
    #[error("config file not found at {path}")]
    NotFound { path: PathBuf },

    /// A required setting has no value after file + environment overlay.
    #[error("missing required setting `{key}`")]
    Missing { key: &'static str },

    /// A setting (usually from the environment) could not be interpreted.
    #[error("invalid value '{value}' for `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
