//! The remote repository seam and stack ↔ path mapping.

use salvage_core::{RemoteFile, RevisionHandle, StackName};

use crate::error::RepoError;

/// Extension of every stack file written to the repository.
pub const STACK_FILE_EXTENSION: &str = "yaml";

/// Result of a successful write or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Revision of the file after the write (`None` after a delete).
    pub revision: Option<RevisionHandle>,
    /// Link to the commit that carried the write, when the backend has one.
    pub commit_url: Option<String>,
}

/// A file listed by [`RemoteRepository::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub revision: RevisionHandle,
}

/// File operations against one repository and branch.
pub trait RemoteRepository {
    /// `owner/name@branch`, or an equivalent label.
    fn describe(&self) -> String;

    /// Read a file. `Ok(None)` when it does not exist.
    fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, RepoError>;

    /// Create (`previous = None`) or update a file.
    ///
    /// An update is guarded by `previous`: if the stored revision differs,
    /// the call fails with [`RepoError::Conflict`]. A create over an
    /// existing file fails the same way.
    fn put_file(
        &self,
        path: &str,
        content: &[u8],
        previous: Option<&RevisionHandle>,
        message: &str,
    ) -> Result<PutOutcome, RepoError>;

    /// Every file below `dir` (recursively). Missing directory → empty list.
    fn list_files(&self, dir: &str) -> Result<Vec<RemoteEntry>, RepoError>;

    /// Delete a file guarded by its current revision.
    fn delete_file(
        &self,
        path: &str,
        revision: &RevisionHandle,
        message: &str,
    ) -> Result<PutOutcome, RepoError>;
}

/// Strip leading/trailing slashes so prefixes compose cleanly.
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_matches('/')
}

/// Repository path for a stack: `<prefix>/<name>.yaml` or `<name>.yaml`.
pub fn remote_path(prefix: &str, name: &StackName) -> String {
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        format!("{name}.{STACK_FILE_EXTENSION}")
    } else {
        format!("{prefix}/{name}.{STACK_FILE_EXTENSION}")
    }
}

/// Inverse of [`remote_path`]. `None` for files Salvage did not write.
pub fn stack_name_from_path(prefix: &str, path: &str) -> Option<StackName> {
    let prefix = normalize_prefix(prefix);
    let rel = if prefix.is_empty() {
        path
    } else {
        path.strip_prefix(prefix)?.strip_prefix('/')?
    };
    let name = rel.strip_suffix(&format!(".{STACK_FILE_EXTENSION}"))?;
    if name.is_empty() {
        return None;
    }
    Some(StackName::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_path_without_prefix() {
        assert_eq!(remote_path("", &StackName::from("web")), "web.yaml");
    }

    #[test]
    fn remote_path_with_prefix_ignores_slashes() {
        assert_eq!(
            remote_path("/stacks/", &StackName::from("web")),
            "stacks/web.yaml"
        );
    }

    #[test]
    fn nested_stack_names_keep_their_directories() {
        assert_eq!(
            remote_path("stacks", &StackName::from("infra/dns")),
            "stacks/infra/dns.yaml"
        );
    }

    #[test]
    fn stack_name_from_path_inverts_remote_path() {
        for prefix in ["", "stacks", "/stacks/"] {
            let name = StackName::from("infra/dns");
            let path = remote_path(prefix, &name);
            assert_eq!(stack_name_from_path(prefix, &path), Some(name));
        }
    }

    #[test]
    fn stack_name_from_path_rejects_foreign_files() {
        assert_eq!(stack_name_from_path("", "README.md"), None);
        assert_eq!(stack_name_from_path("stacks", "other/web.yaml"), None);
        assert_eq!(stack_name_from_path("stacks", "stacksweb.yaml"), None);
        assert_eq!(stack_name_from_path("", ".yaml"), None);
    }
}
