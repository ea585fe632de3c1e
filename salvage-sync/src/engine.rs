//! Compare-and-write loop over one run's stacks.

use std::collections::HashSet;

use salvage_core::{
    ChangeAction, ChangeRecord, FailureKind, Settings, Stack, StackFailure, StackName, SyncReport,
};

use crate::error::{RepoError, SyncError};
use crate::repository::{normalize_prefix, remote_path, stack_name_from_path, RemoteRepository};

/// Knobs for a single [`sync_stacks`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Directory in the repository that holds the stack files.
    pub path_prefix: String,
    /// Delete remote stack files whose stack is gone.
    pub prune: bool,
    /// Read and compare only.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn from_settings(settings: &Settings, dry_run: bool) -> Self {
        Self {
            path_prefix: settings.github.path_prefix.clone(),
            prune: settings.sync.prune,
            dry_run,
        }
    }
}

/// Bring the repository in line with `stacks`.
///
/// Stacks are processed in order. A conflict, network or API failure on one
/// stack is recorded in [`SyncReport::failures`] and the loop moves on; an
/// authentication failure aborts the run.
pub fn sync_stacks<R>(
    stacks: &[Stack],
    repo: &R,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    R: RemoteRepository + ?Sized,
{
    let mut report = SyncReport::new(options.dry_run);

    for stack in stacks {
        let path = remote_path(&options.path_prefix, &stack.name);
        match sync_one(stack, &path, repo, options.dry_run) {
            Ok(Some(change)) => report.changes.push(change),
            Ok(None) => report.unchanged += 1,
            Err(err) if err.is_auth() => {
                tracing::error!("{}: {err}", stack.name);
                return Err(err.into());
            }
            Err(err) => {
                tracing::warn!("skipping {} ({path}): {err}", stack.name);
                report.failures.push(failure(&stack.name, &path, &err));
            }
        }
    }

    if options.prune {
        prune(stacks, repo, options, &mut report)?;
    }

    tracing::info!(
        "{} created, {} updated, {} deleted, {} unchanged, {} failed{}",
        report.count(ChangeAction::Created),
        report.count(ChangeAction::Updated),
        report.count(ChangeAction::Deleted),
        report.unchanged,
        report.failures.len(),
        if options.dry_run { " (dry run)" } else { "" },
    );
    Ok(report)
}

/// `Ok(None)` when the remote copy already matches.
fn sync_one<R>(
    stack: &Stack,
    path: &str,
    repo: &R,
    dry_run: bool,
) -> Result<Option<ChangeRecord>, RepoError>
where
    R: RemoteRepository + ?Sized,
{
    let existing = repo.get_file(path)?;

    let (action, previous) = match &existing {
        None => (ChangeAction::Created, None),
        Some(remote) if remote.content == stack.content => {
            tracing::debug!("{} unchanged", stack.name);
            return Ok(None);
        }
        Some(remote) => (ChangeAction::Updated, Some(&remote.revision)),
    };

    let mut record = ChangeRecord::new(stack.name.clone(), action, path);
    record.origin = stack.origin.clone();

    if dry_run {
        tracing::info!("would {} {path}", verb(action).to_lowercase());
        return Ok(Some(record));
    }

    let message = commit_message(action, path);
    let outcome = repo.put_file(path, &stack.content, previous, &message)?;
    tracing::info!("{message}");
    record.commit_url = outcome.commit_url;
    Ok(Some(record))
}

fn prune<R>(
    stacks: &[Stack],
    repo: &R,
    options: &SyncOptions,
    report: &mut SyncReport,
) -> Result<(), SyncError>
where
    R: RemoteRepository + ?Sized,
{
    let prefix = normalize_prefix(&options.path_prefix);
    if prefix.is_empty() {
        tracing::warn!("prune needs a path prefix; leaving remote files alone");
        return Ok(());
    }

    let entries = match repo.list_files(prefix) {
        Ok(entries) => entries,
        Err(err) if err.is_auth() => return Err(err.into()),
        Err(err) => {
            tracing::warn!("could not list {prefix} for pruning: {err}");
            return Ok(());
        }
    };

    let live: HashSet<&StackName> = stacks.iter().map(|s| &s.name).collect();
    for entry in entries {
        let Some(name) = stack_name_from_path(prefix, &entry.path) else {
            continue;
        };
        if live.contains(&name) || is_hidden(&entry.path) {
            continue;
        }

        let mut record = ChangeRecord::new(name.clone(), ChangeAction::Deleted, entry.path.clone());
        if options.dry_run {
            tracing::info!("would delete {}", entry.path);
            report.changes.push(record);
            continue;
        }

        let message = commit_message(ChangeAction::Deleted, &entry.path);
        match repo.delete_file(&entry.path, &entry.revision, &message) {
            Ok(outcome) => {
                tracing::info!("{message}");
                record.commit_url = outcome.commit_url;
                report.changes.push(record);
            }
            Err(err) if err.is_auth() => return Err(err.into()),
            Err(err) => {
                tracing::warn!("could not delete {}: {err}", entry.path);
                report.failures.push(failure(&name, &entry.path, &err));
            }
        }
    }
    Ok(())
}

/// `Create web.yaml`, `Update web.yaml`, `Delete web.yaml`.
pub fn commit_message(action: ChangeAction, path: &str) -> String {
    format!("{} {path}", verb(action))
}

fn verb(action: ChangeAction) -> &'static str {
    match action {
        ChangeAction::Created => "Create",
        ChangeAction::Updated => "Update",
        ChangeAction::Deleted => "Delete",
    }
}

fn is_hidden(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with('.'))
}

fn failure(stack: &StackName, path: &str, err: &RepoError) -> StackFailure {
    let kind = match err {
        RepoError::Conflict { .. } => FailureKind::Conflict,
        RepoError::Network { .. } => FailureKind::Network,
        RepoError::Api { .. } | RepoError::Decode { .. } => FailureKind::Api,
        _ => FailureKind::Other,
    };
    StackFailure {
        stack: stack.clone(),
        path: path.to_string(),
        kind,
        reason: err.to_string(),
    }
}
