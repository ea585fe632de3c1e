pub mod diff;
pub mod list;
pub mod sync;

use std::time::Duration;

use anyhow::{Context, Result};

use salvage_core::Settings;
use salvage_sync::GitHubRepository;

pub fn http_timeout(settings: &Settings) -> Duration {
    Duration::from_secs(settings.http_timeout_secs)
}

/// Open and verify the configured GitHub repository.
pub fn open_repository(settings: &Settings) -> Result<GitHubRepository> {
    GitHubRepository::from_settings(&settings.github, http_timeout(settings))
        .context("could not open the GitHub repository")
}
