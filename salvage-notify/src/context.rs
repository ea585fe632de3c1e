//! Notification payloads and the template context built from them.

use serde::{Deserialize, Serialize};

use salvage_core::{ChangeRecord, StackFailure, SyncReport};

use crate::error::NotifyError;

/// What a run has to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// At least one stack was written, deleted or skipped on error.
    Changes(SyncReport),
    /// Every stack already matched its remote copy.
    NoChanges { unchanged: usize },
    /// The run aborted.
    Fatal(String),
}

impl Notification {
    /// Pick the message for a finished run, or `None` when nothing should
    /// be sent. Quiet runs are only announced when `announce_no_changes`.
    pub fn for_report(report: &SyncReport, announce_no_changes: bool) -> Option<Self> {
        if report.has_changes() || !report.failures.is_empty() {
            Some(Notification::Changes(report.clone()))
        } else if announce_no_changes {
            Some(Notification::NoChanges {
                unchanged: report.unchanged,
            })
        } else {
            None
        }
    }

    /// Name of the template that renders this notification.
    pub fn template_name(&self) -> &'static str {
        match self {
            Notification::Changes(_) => "changes.txt.tera",
            Notification::NoChanges { .. } => "no_changes.txt.tera",
            Notification::Fatal(_) => "fatal.txt.tera",
        }
    }
}

/// Rendering payload shared by every template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContext {
    pub repository: String,
    pub dry_run: bool,
    pub changes: Vec<ChangeRecord>,
    pub failures: Vec<StackFailure>,
    pub unchanged: usize,
    pub error: Option<String>,
}

impl MessageContext {
    pub fn new(notification: &Notification, repository: &str) -> Self {
        let mut ctx = MessageContext {
            repository: repository.to_string(),
            ..Default::default()
        };
        match notification {
            Notification::Changes(report) => {
                ctx.dry_run = report.dry_run;
                ctx.changes = report.changes.clone();
                ctx.failures = report.failures.clone();
                ctx.unchanged = report.unchanged;
            }
            Notification::NoChanges { unchanged } => ctx.unchanged = *unchanged,
            Notification::Fatal(message) => ctx.error = Some(message.clone()),
        }
        ctx
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, NotifyError> {
        tera::Context::from_serialize(self).map_err(NotifyError::from)
    }
}

#[cfg(test)]
mod tests {
    use salvage_core::{ChangeAction, StackName};

    use super::*;

    fn report_with_change() -> SyncReport {
        let mut report = SyncReport::new(false);
        report.changes.push(ChangeRecord::new(
            StackName::from("web"),
            ChangeAction::Created,
            "web.yaml",
        ));
        report
    }

    #[test]
    fn quiet_run_is_silent_by_default() {
        let report = SyncReport::new(false);
        assert_eq!(Notification::for_report(&report, false), None);
    }

    #[test]
    fn quiet_run_is_announced_when_asked() {
        let mut report = SyncReport::new(false);
        report.unchanged = 3;
        assert_eq!(
            Notification::for_report(&report, true),
            Some(Notification::NoChanges { unchanged: 3 })
        );
    }

    #[test]
    fn changes_always_notify() {
        let report = report_with_change();
        assert!(matches!(
            Notification::for_report(&report, false),
            Some(Notification::Changes(_))
        ));
    }

    #[test]
    fn context_carries_fatal_error() {
        let ctx = MessageContext::new(&Notification::Fatal("boom".into()), "acme/backups@main");
        assert_eq!(ctx.error.as_deref(), Some("boom"));
        assert!(ctx.to_tera_context().is_ok());
    }
}
