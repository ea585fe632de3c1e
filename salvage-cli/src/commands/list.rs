//! `salvage list`: show the stacks the configured source provides.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use salvage_core::{Settings, Stack};
use salvage_source::build_source;
use salvage_sync::remote_path;

/// Arguments for `salvage list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StackJson {
    name: String,
    path: String,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "stack")]
    name: String,
    #[tabled(rename = "remote path")]
    path: String,
    #[tabled(rename = "bytes")]
    bytes: usize,
    #[tabled(rename = "updated")]
    updated: String,
}

impl ListArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        settings.validate_source().context("invalid configuration")?;

        let source = build_source(&settings).context("could not set up the stack source")?;
        let stacks = source
            .stacks()
            .with_context(|| format!("could not enumerate {}", source.describe()))?;
        let rows: Vec<StackJson> = stacks
            .iter()
            .map(|s| describe(s, &settings.github.path_prefix))
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize stack list")?
            );
            return Ok(());
        }

        println!("{} stack(s) from {}", rows.len(), source.describe());
        let table_rows: Vec<StackRow> = rows
            .into_iter()
            .map(|row| StackRow {
                name: row.name,
                path: row.path,
                bytes: row.bytes,
                updated: row.updated_at.unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        let mut table = Table::new(table_rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn describe(stack: &Stack, prefix: &str) -> StackJson {
    let updated_at = stack
        .origin
        .as_ref()
        .and_then(|o| o.updated_at.or(o.created_at))
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string());
    StackJson {
        name: stack.name.to_string(),
        path: remote_path(prefix, &stack.name),
        bytes: stack.content.len(),
        updated_at,
    }
}
