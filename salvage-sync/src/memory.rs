//! In-process [`RemoteRepository`] with SHA-256 revisions.
//!
//! Used by the engine and pipeline tests; also handy for trying a source
//! configuration without touching GitHub. Failure injection lets tests
//! exercise the per-stack isolation rules.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use salvage_core::{RemoteFile, RevisionHandle};

use crate::error::RepoError;
use crate::repository::{PutOutcome, RemoteEntry, RemoteRepository};

/// Number of calls made against a [`MemoryRepository`], per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub gets: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub lists: usize,
}

impl CallCounts {
    /// Creates + updates + deletes.
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    conflict_on_put: HashSet<String>,
    network_on_get: HashSet<String>,
    reject_auth: bool,
    counts: CallCounts,
    commits: usize,
}

/// Thread-safe in-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

/// Revision of `content`: hex SHA-256.
pub fn content_revision(content: &[u8]) -> RevisionHandle {
    let mut h = Sha256::new();
    h.update(content);
    RevisionHandle(hex::encode(h.finalize()))
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    /// Store a file directly, bypassing counters.
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.lock().files.insert(path.to_string(), content.into());
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    pub fn counts(&self) -> CallCounts {
        self.lock().counts
    }

    /// Every `put_file` on `path` fails with [`RepoError::Conflict`].
    pub fn fail_put_with_conflict(&self, path: &str) {
        self.lock().conflict_on_put.insert(path.to_string());
    }

    /// Every `get_file` on `path` fails with [`RepoError::Network`].
    pub fn fail_get_with_network(&self, path: &str) {
        self.lock().network_on_get.insert(path.to_string());
    }

    /// Every call fails with [`RepoError::Auth`].
    pub fn reject_credentials(&self) {
        self.lock().reject_auth = true;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn auth_error() -> RepoError {
    RepoError::Auth {
        status: 401,
        message: "Bad credentials".to_string(),
    }
}

fn conflict(path: &str, message: &str) -> RepoError {
    RepoError::Conflict {
        path: path.to_string(),
        message: message.to_string(),
    }
}

impl RemoteRepository for MemoryRepository {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, RepoError> {
        let mut state = self.lock();
        state.counts.gets += 1;
        if state.reject_auth {
            return Err(auth_error());
        }
        if state.network_on_get.contains(path) {
            return Err(RepoError::Network {
                url: format!("memory://{path}"),
                message: "connection reset".to_string(),
            });
        }
        Ok(state.files.get(path).map(|content| RemoteFile {
            path: path.to_string(),
            content: content.clone(),
            revision: content_revision(content),
        }))
    }

    fn put_file(
        &self,
        path: &str,
        content: &[u8],
        previous: Option<&RevisionHandle>,
        _message: &str,
    ) -> Result<PutOutcome, RepoError> {
        let mut state = self.lock();
        if state.reject_auth {
            return Err(auth_error());
        }
        match previous {
            None => state.counts.creates += 1,
            Some(_) => state.counts.updates += 1,
        }
        if state.conflict_on_put.contains(path) {
            return Err(conflict(path, "injected conflict"));
        }

        let current = state.files.get(path).map(|c| content_revision(c));
        match (previous, current) {
            (None, Some(_)) => return Err(conflict(path, "file already exists")),
            (Some(_), None) => return Err(conflict(path, "file no longer exists")),
            (Some(expected), Some(actual)) if *expected != actual => {
                return Err(conflict(path, "revision mismatch"))
            }
            _ => {}
        }

        state.files.insert(path.to_string(), content.to_vec());
        state.commits += 1;
        Ok(PutOutcome {
            revision: Some(content_revision(content)),
            commit_url: Some(format!("memory://commit/{}", state.commits)),
        })
    }

    fn list_files(&self, dir: &str) -> Result<Vec<RemoteEntry>, RepoError> {
        let mut state = self.lock();
        state.counts.lists += 1;
        if state.reject_auth {
            return Err(auth_error());
        }
        let dir = dir.trim_matches('/');
        Ok(state
            .files
            .iter()
            .filter(|(path, _)| {
                dir.is_empty()
                    || path
                        .strip_prefix(dir)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(|(path, content)| RemoteEntry {
                path: path.clone(),
                revision: content_revision(content),
            })
            .collect())
    }

    fn delete_file(
        &self,
        path: &str,
        revision: &RevisionHandle,
        _message: &str,
    ) -> Result<PutOutcome, RepoError> {
        let mut state = self.lock();
        state.counts.deletes += 1;
        if state.reject_auth {
            return Err(auth_error());
        }
        let current = state.files.get(path).map(|c| content_revision(c));
        if current.as_ref() != Some(revision) {
            return Err(conflict(path, "revision mismatch"));
        }
        state.files.remove(path);
        state.commits += 1;
        Ok(PutOutcome {
            revision: None,
            commit_url: Some(format!("memory://commit/{}", state.commits)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_update_with_current_revision() {
        let repo = MemoryRepository::new();
        repo.put_file("web.yaml", b"v1", None, "Create web.yaml")
            .expect("create");
        let stored = repo.get_file("web.yaml").unwrap().expect("stored");
        assert_eq!(stored.content, b"v1".to_vec());

        repo.put_file("web.yaml", b"v2", Some(&stored.revision), "Update web.yaml")
            .expect("update");
        assert_eq!(repo.content("web.yaml"), Some(b"v2".to_vec()));
        assert_eq!(repo.counts().creates, 1);
        assert_eq!(repo.counts().updates, 1);
    }

    #[test]
    fn stale_revision_is_conflict() {
        let repo = MemoryRepository::new().with_file("web.yaml", "v1");
        let stale = content_revision(b"v0");
        let err = repo
            .put_file("web.yaml", b"v2", Some(&stale), "Update web.yaml")
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.content("web.yaml"), Some(b"v1".to_vec()));
    }

    #[test]
    fn create_over_existing_is_conflict() {
        let repo = MemoryRepository::new().with_file("web.yaml", "v1");
        let err = repo.put_file("web.yaml", b"v2", None, "Create").unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn list_files_filters_by_directory() {
        let repo = MemoryRepository::new()
            .with_file("stacks/web.yaml", "a")
            .with_file("stacks/infra/dns.yaml", "b")
            .with_file("stacksish.yaml", "c")
            .with_file("README.md", "d");
        let mut paths: Vec<_> = repo
            .list_files("stacks")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["stacks/infra/dns.yaml", "stacks/web.yaml"]);
        assert_eq!(repo.list_files("").unwrap().len(), 4);
    }

    #[test]
    fn delete_requires_current_revision() {
        let repo = MemoryRepository::new().with_file("web.yaml", "v1");
        let err = repo
            .delete_file("web.yaml", &content_revision(b"other"), "Delete")
            .unwrap_err();
        assert!(err.is_conflict());

        repo.delete_file("web.yaml", &content_revision(b"v1"), "Delete")
            .expect("delete");
        assert!(repo.content("web.yaml").is_none());
    }

    #[test]
    fn rejected_credentials_fail_every_call() {
        let repo = MemoryRepository::new();
        repo.reject_credentials();
        assert!(repo.get_file("x").unwrap_err().is_auth());
        assert!(repo.put_file("x", b"", None, "m").unwrap_err().is_auth());
    }
}
