//! Read-only unified diff for `salvage diff`.

use similar::TextDiff;

use salvage_core::{ChangeAction, Stack, StackName};

use crate::error::SyncError;
use crate::repository::{remote_path, RemoteRepository};

/// Pending change for one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDiff {
    pub stack: StackName,
    pub path: String,
    pub action: ChangeAction,
    pub unified_diff: String,
}

/// Compare every stack with its remote copy. Nothing is written.
///
/// Stacks whose remote copy matches are left out. Any repository error
/// aborts the diff.
pub fn diff_stacks<R>(stacks: &[Stack], repo: &R, prefix: &str) -> Result<Vec<StackDiff>, SyncError>
where
    R: RemoteRepository + ?Sized,
{
    let mut diffs = Vec::new();
    for stack in stacks {
        let path = remote_path(prefix, &stack.name);
        let remote = repo.get_file(&path)?;
        let (action, existing) = match &remote {
            Some(file) if file.content == stack.content => continue,
            Some(file) => (ChangeAction::Updated, normalize(&file.content)),
            None => (ChangeAction::Created, String::new()),
        };
        let current = normalize(&stack.content);

        let old_header = match action {
            ChangeAction::Created => "/dev/null".to_string(),
            _ => format!("a/{path}"),
        };
        let new_header = format!("b/{path}");
        let unified = TextDiff::from_lines(&existing, &current)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();

        tracing::debug!("{} would be {action}", stack.name);
        diffs.push(StackDiff {
            stack: stack.name.clone(),
            path,
            action,
            unified_diff: unified,
        });
    }
    Ok(diffs)
}

fn normalize(content: &[u8]) -> String {
    String::from_utf8_lossy(content).replace("\r\n", "\n")
}
