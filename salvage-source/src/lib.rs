//! # salvage-source
//!
//! Stack enumeration. A [`StackSource`] yields every stack for the current
//! run or fails as a whole; callers never see a partial list.
//!
//! - [`DirectorySource`]: files under a mounted directory
//! - [`PortainerSource`]: stacks from a Portainer instance

pub mod directory;
pub mod error;
pub mod portainer;
pub mod tls;

use std::time::Duration;

use salvage_core::{ConfigError, Settings, SourceMode, Stack};

pub use directory::DirectorySource;
pub use error::SourceError;
pub use portainer::{PortainerSource, PortainerStack};

/// Produces the stacks for one run.
pub trait StackSource {
    /// Human-readable origin used in logs and notifications.
    fn describe(&self) -> String;

    /// Enumerate every stack, in a stable order.
    fn stacks(&self) -> Result<Vec<Stack>, SourceError>;
}

/// Build the source selected by `settings.source.mode`.
pub fn build_source(settings: &Settings) -> Result<Box<dyn StackSource>, SourceError> {
    settings.validate_source()?;
    match settings.source.mode {
        SourceMode::Directory => Ok(Box::new(DirectorySource::new(
            settings.source.directory.clone(),
            settings.source.extensions.clone(),
        ))),
        SourceMode::Portainer => {
            let p = &settings.portainer;
            let url = p
                .url
                .clone()
                .ok_or(ConfigError::Missing { key: "PORTAINER_URL" })?;
            let username = p.username.clone().ok_or(ConfigError::Missing {
                key: "PORTAINER_USERNAME",
            })?;
            let password = p.password.clone().ok_or(ConfigError::Missing {
                key: "PORTAINER_PASSWORD",
            })?;
            let source = PortainerSource::new(
                url,
                username,
                password,
                Duration::from_secs(settings.http_timeout_secs),
            );
            if p.insecure_tls {
                Ok(Box::new(source.with_insecure_tls()?))
            } else {
                Ok(Box::new(source))
            }
        }
    }
}
