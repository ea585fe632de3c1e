//! Domain types shared by every Salvage crate.
//!
//! A [`Stack`] is produced fresh by a source on every run, a [`RemoteFile`]
//! is whatever the remote repository currently stores, and a
//! [`ChangeRecord`] notes one write the sync engine performed (or would
//! perform in dry-run mode).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a stack. Unique within a single run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackName(pub String);

impl StackName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for StackName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StackName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque revision token of a remote file (the git blob SHA on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionHandle(pub String);

impl fmt::Display for RevisionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RevisionHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RevisionHandle {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

/// Where a stack came from, when the source knows more than its content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOrigin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// A named stack definition and its raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub name: StackName,
    pub content: Vec<u8>,
    pub origin: Option<StackOrigin>,
}

impl Stack {
    pub fn new(name: impl Into<StackName>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: StackOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// A file as currently stored in the remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content: Vec<u8>,
    pub revision: RevisionHandle,
}

// ---------------------------------------------------------------------------
// Change records
// ---------------------------------------------------------------------------

/// What the sync engine did to a stack's remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Created => write!(f, "created"),
            ChangeAction::Updated => write!(f, "updated"),
            ChangeAction::Deleted => write!(f, "deleted"),
        }
    }
}

/// One remote write performed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub stack: StackName,
    pub action: ChangeAction,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<StackOrigin>,
}

impl ChangeRecord {
    pub fn new(stack: StackName, action: ChangeAction, path: impl Into<String>) -> Self {
        Self {
            stack,
            action,
            path: path.into(),
            commit_url: None,
            origin: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Why a single stack was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The remote file changed between read and write.
    Conflict,
    Network,
    Api,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Conflict => write!(f, "conflict"),
            FailureKind::Network => write!(f, "network"),
            FailureKind::Api => write!(f, "api"),
            FailureKind::Other => write!(f, "other"),
        }
    }
}

/// A stack the run could not back up. The rest of the run continued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFailure {
    pub stack: StackName,
    pub path: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Writes in source order, followed by prune deletions.
    pub changes: Vec<ChangeRecord>,
    /// Stacks whose remote copy already matched.
    pub unchanged: usize,
    pub failures: Vec<StackFailure>,
    /// Set when the changes were computed but not written.
    pub dry_run: bool,
}

impl SyncReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(StackName::from("web").to_string(), "web");
        assert_eq!(RevisionHandle::from("abc123").to_string(), "abc123");
    }

    #[test]
    fn change_action_display_is_lowercase() {
        assert_eq!(ChangeAction::Created.to_string(), "created");
        assert_eq!(ChangeAction::Updated.to_string(), "updated");
        assert_eq!(ChangeAction::Deleted.to_string(), "deleted");
    }

    #[test]
    fn change_record_skips_empty_optionals() {
        let record = ChangeRecord::new(StackName::from("web"), ChangeAction::Created, "web.yaml");
        let yaml = serde_yaml::to_string(&record).expect("serialize");
        assert!(yaml.contains("action: created"));
        assert!(!yaml.contains("commit_url"));
        assert!(!yaml.contains("origin"));
    }

    #[test]
    fn stack_new_accepts_str_content() {
        let stack = Stack::new("web", "image: nginx");
        assert_eq!(stack.name.as_str(), "web");
        assert_eq!(stack.content, b"image: nginx".to_vec());
        assert!(stack.origin.is_none());
    }

    #[test]
    fn report_counts_by_action() {
        let mut report = SyncReport::new(false);
        assert!(!report.has_changes());
        report.changes.push(ChangeRecord::new("web".into(), ChangeAction::Created, "web.yaml"));
        report.changes.push(ChangeRecord::new("db".into(), ChangeAction::Updated, "db.yaml"));
        report.changes.push(ChangeRecord::new("ci".into(), ChangeAction::Created, "ci.yaml"));
        assert!(report.has_changes());
        assert_eq!(report.count(ChangeAction::Created), 2);
        assert_eq!(report.count(ChangeAction::Deleted), 0);
    }
}
