//! Tera rendering of notification text.

use tera::Tera;

use crate::context::{MessageContext, Notification};
use crate::error::NotifyError;

// Embedded at compile time.
const TPLS: &[(&str, &str)] = &[
    ("changes.txt.tera", include_str!("templates/changes.txt.tera")),
    ("no_changes.txt.tera", include_str!("templates/no_changes.txt.tera")),
    ("fatal.txt.tera", include_str!("templates/fatal.txt.tera")),
];

/// Renders the plain-text part of every notification.
///
/// Create once with [`MessageRenderer::new`] and reuse.
pub struct MessageRenderer {
    tera: Tera,
}

impl MessageRenderer {
    pub fn new() -> Result<Self, NotifyError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TPLS.iter().copied())?;
        Ok(MessageRenderer { tera })
    }

    /// Render `notification` for the repository labelled `repository`.
    pub fn render(
        &self,
        notification: &Notification,
        repository: &str,
    ) -> Result<String, NotifyError> {
        let ctx = MessageContext::new(notification, repository).to_tera_context()?;
        let text = self.tera.render(notification.template_name(), &ctx)?;
        Ok(text.trim_end().to_string())
    }
}
