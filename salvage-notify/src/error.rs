//! Error types for salvage-notify.

use thiserror::Error;

/// Failures while rendering or delivering a notification.
///
/// None of these change the outcome of a run; callers log them.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The webhook answered with a non-2xx status.
    #[error("webhook rejected the message (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The webhook could not be reached. The URL is withheld; it is a secret.
    #[error("webhook unreachable: {message}")]
    Network { message: String },
}
