//! `salvage sync`: commit new and changed stacks.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use salvage_core::{ChangeAction, Settings, SyncReport};
use salvage_notify::{DiscordNotifier, Notification, Notifier};
use salvage_source::build_source;
use salvage_sync::{pipeline, RemoteRepository, SyncOptions};

use super::{http_timeout, open_repository};

/// Arguments for `salvage sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Compare only: report what would be committed without writing or notifying.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SummaryJson<'a> {
    repository: &'a str,
    #[serde(flatten)]
    report: &'a SyncReport,
}

impl SyncArgs {
    pub fn run(self, settings: Settings) -> Result<()> {
        settings.validate().context("invalid configuration")?;

        match self.execute(&settings) {
            Ok((report, repository)) => {
                if self.json {
                    let summary = SummaryJson {
                        repository: &repository,
                        report: &report,
                    };
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&summary)
                            .context("failed to serialize run summary")?
                    );
                } else {
                    print_summary(&repository, &report);
                }

                if !self.dry_run {
                    if let Some(notification) =
                        Notification::for_report(&report, settings.notify.no_changes)
                    {
                        send(&settings, &repository, &notification);
                    }
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!("{err:#}");
                if settings.notify.errors && !self.dry_run {
                    let repository = settings.github.repository.clone().unwrap_or_default();
                    send(&settings, &repository, &Notification::Fatal(format!("{err:#}")));
                }
                Err(err)
            }
        }
    }

    fn execute(&self, settings: &Settings) -> Result<(SyncReport, String)> {
        let source = build_source(settings).context("could not set up the stack source")?;
        let repo = open_repository(settings)?;
        let options = SyncOptions::from_settings(settings, self.dry_run);
        let report = pipeline::run(source.as_ref(), &repo, &options).context("sync failed")?;
        Ok((report, repo.describe()))
    }
}

/// Deliver `notification` if a webhook is configured. Failures are logged only.
fn send(settings: &Settings, repository: &str, notification: &Notification) {
    let Some(url) = settings.notify.discord_webhook_url.clone() else {
        tracing::debug!("no webhook configured, skipping notification");
        return;
    };
    let result = DiscordNotifier::new(url, http_timeout(settings))
        .map(|n| n.with_repository(repository))
        .and_then(|n| n.notify(notification));
    if let Err(err) = result {
        tracing::warn!("notification failed: {err}");
    }
}

fn print_summary(repository: &str, report: &SyncReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}{} {repository}: {} created, {} updated, {} deleted, {} unchanged",
        "✓".green().bold(),
        report.count(ChangeAction::Created),
        report.count(ChangeAction::Updated),
        report.count(ChangeAction::Deleted),
        report.unchanged,
    );

    for change in &report.changes {
        let marker = match change.action {
            ChangeAction::Created => "+".green(),
            ChangeAction::Updated => "~".yellow(),
            ChangeAction::Deleted => "-".red(),
        };
        match &change.commit_url {
            Some(url) => println!("  {marker}  {}  {}", change.stack, url.bright_black()),
            None => println!("  {marker}  {}  {}", change.stack, change.path.bright_black()),
        }
    }

    for failure in &report.failures {
        println!(
            "  {}  {} ({}): {}",
            "!".red().bold(),
            failure.stack,
            failure.kind,
            failure.reason
        );
    }
}
