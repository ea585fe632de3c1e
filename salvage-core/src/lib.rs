//! Salvage core library: domain types, settings, errors.
//!
//! - [`types`]: stacks, remote files, change records, run reports
//! - [`config`]: [`Settings`] loading (YAML file + environment)
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Secret, Settings, SourceMode};
pub use error::ConfigError;
pub use types::{
    ChangeAction, ChangeRecord, FailureKind, RemoteFile, RevisionHandle, Stack, StackFailure,
    StackName, StackOrigin, SyncReport,
};
