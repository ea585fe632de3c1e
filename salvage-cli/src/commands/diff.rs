//! `salvage diff`: show unified diffs for what sync would commit.

use anyhow::{Context, Result};
use clap::Args;

use salvage_core::Settings;
use salvage_source::build_source;
use salvage_sync::{diff_stacks, RemoteRepository};

use super::open_repository;

/// Arguments for `salvage diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        settings.validate().context("invalid configuration")?;

        let source = build_source(&settings).context("could not set up the stack source")?;
        let stacks = source
            .stacks()
            .with_context(|| format!("could not enumerate {}", source.describe()))?;
        let repo = open_repository(&settings)?;

        let diffs = diff_stacks(&stacks, &repo, &settings.github.path_prefix)
            .with_context(|| format!("diff against {} failed", repo.describe()))?;

        if diffs.is_empty() {
            println!("No differences for {}.", repo.describe());
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
