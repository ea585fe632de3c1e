//! Shared run entrypoint: enumerate, then sync.

use salvage_core::SyncReport;
use salvage_source::StackSource;

use crate::engine::{sync_stacks, SyncOptions};
use crate::error::SyncError;
use crate::repository::RemoteRepository;

/// Enumerate `source` and sync the result into `repo`.
///
/// Enumeration failures abort before the repository is touched.
pub fn run<R>(
    source: &dyn StackSource,
    repo: &R,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    R: RemoteRepository + ?Sized,
{
    let stacks = source.stacks().map_err(|err| {
        tracing::error!("could not enumerate {}: {err}", source.describe());
        SyncError::from(err)
    })?;
    tracing::info!(
        "found {} stack(s) in {}, syncing to {}",
        stacks.len(),
        source.describe(),
        repo.describe()
    );
    sync_stacks(&stacks, repo, options)
}

#[cfg(test)]
mod tests {
    use salvage_core::{ChangeAction, Stack};
    use salvage_source::SourceError;

    use super::*;
    use crate::memory::MemoryRepository;

    struct FixedSource(Vec<Stack>);

    impl StackSource for FixedSource {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn stacks(&self) -> Result<Vec<Stack>, SourceError> {
            Ok(self.0.clone())
        }
    }

    struct DownSource;

    impl StackSource for DownSource {
        fn describe(&self) -> String {
            "down".to_string()
        }

        fn stacks(&self) -> Result<Vec<Stack>, SourceError> {
            Err(SourceError::Network {
                url: "http://127.0.0.1:9/api/stacks".to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn run_syncs_enumerated_stacks() {
        let repo = MemoryRepository::new();
        let source = FixedSource(vec![Stack::new("web", "image: nginx")]);

        let report = run(&source, &repo, &SyncOptions::default()).expect("run");

        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].action, ChangeAction::Created);
    }

    #[test]
    fn source_failure_aborts_before_any_repository_call() {
        let repo = MemoryRepository::new();

        let err = run(&DownSource, &repo, &SyncOptions::default()).unwrap_err();

        assert!(matches!(err, SyncError::SourceUnavailable(_)));
        assert_eq!(repo.counts(), Default::default());
    }

    #[test]
    fn run_accepts_boxed_repository() {
        let repo: Box<dyn RemoteRepository> = Box::new(MemoryRepository::new());
        let source = FixedSource(vec![Stack::new("web", "a")]);

        let report = run(&source, repo.as_ref(), &SyncOptions::default()).expect("run");
        assert_eq!(report.changes.len(), 1);
    }
}
