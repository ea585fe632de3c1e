//! Discord webhook delivery.
//!
//! One message carries the rendered summary as `content` and up to ten
//! embeds, one per change. Longer change lists and summaries spill into
//! follow-up messages.

use std::borrow::Cow;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use salvage_core::{ChangeAction, ChangeRecord, Secret, StackOrigin};

use crate::context::Notification;
use crate::engine::MessageRenderer;
use crate::error::NotifyError;

/// Discord's per-message embed limit.
pub const MAX_EMBEDS: usize = 10;
/// Discord's per-message `content` limit, in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;
const EMBED_COLOR: u32 = 0x1D63ED;
const MAX_RETRY_WAIT: Duration = Duration::from_secs(5);

/// Delivers run notifications somewhere a human will see them.
pub trait Notifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub color: u32,
    pub author: EmbedAuthor,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: String, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value,
            inline,
        }
    }
}

/// Discord relative timestamp markup, e.g. "3 minutes ago".
fn relative(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

fn action_title(action: ChangeAction) -> &'static str {
    match action {
        ChangeAction::Created => "Created",
        ChangeAction::Updated => "Updated",
        ChangeAction::Deleted => "Deleted",
    }
}

fn origin_field(label: &str, by: Option<&str>, at: Option<DateTime<Utc>>) -> Option<EmbedField> {
    let value = match (by, at) {
        (Some(by), Some(at)) => format!("{by}, {}", relative(at)),
        (Some(by), None) => by.to_string(),
        (None, Some(at)) => relative(at),
        (None, None) => return None,
    };
    Some(EmbedField::new(label, value, true))
}

/// One embed describing a single change, detected at `now`.
pub fn change_embed(change: &ChangeRecord, now: DateTime<Utc>) -> Embed {
    let action = match &change.commit_url {
        Some(url) => format!("[{}]({url})", action_title(change.action)),
        None => action_title(change.action).to_string(),
    };
    let mut fields = vec![
        EmbedField::new("Stack", change.stack.to_string(), true),
        EmbedField::new("Action", action, true),
        EmbedField::new("Detected", relative(now), true),
    ];
    if let Some(origin) = &change.origin {
        let StackOrigin {
            created_at,
            created_by,
            updated_at,
            updated_by,
        } = origin;
        fields.extend(origin_field("Created", created_by.as_deref(), *created_at));
        fields.extend(origin_field("Updated", updated_by.as_deref(), *updated_at));
    }
    fields.push(EmbedField::new(
        "File",
        format!("```\n{}\n```", change.path),
        false,
    ));

    Embed {
        color: EMBED_COLOR,
        author: EmbedAuthor {
            name: "Salvage".to_string(),
        },
        fields,
        footer: EmbedFooter {
            text: "Docker".to_string(),
        },
        timestamp: now.to_rfc3339(),
    }
}

/// Break `text` on line boundaries into pieces of at most `limit` characters.
///
/// A single line longer than `limit` is cut short and ends with `…`.
pub fn split_content(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line = truncate(line, limit);
        let len = line.chars().count();
        if !current.is_empty() && current_len + 1 + len > limit {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&line);
        current_len += len;
    }
    if !current.is_empty() || pieces.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn truncate(line: &str, limit: usize) -> Cow<'_, str> {
    if line.chars().count() <= limit {
        return Cow::Borrowed(line);
    }
    let mut cut: String = line.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    Cow::Owned(cut)
}

/// Split a notification into webhook messages.
///
/// Message `i` carries the `i`th piece of `content` and the `i`th group of
/// ten embeds, whichever exist.
pub fn build_messages(content: String, changes: &[ChangeRecord], now: DateTime<Utc>) -> Vec<WebhookMessage> {
    let mut texts = split_content(&content, MAX_CONTENT_CHARS).into_iter();
    let embeds: Vec<Embed> = changes.iter().map(|c| change_embed(c, now)).collect();
    let mut chunks = embeds.chunks(MAX_EMBEDS);

    let mut messages = Vec::new();
    loop {
        let content = texts.next();
        let embeds = chunks.next().map(<[Embed]>::to_vec).unwrap_or_default();
        if content.is_none() && embeds.is_empty() {
            break;
        }
        messages.push(WebhookMessage {
            username: "Salvage".to_string(),
            content,
            embeds,
        });
    }
    messages
}

// ---------------------------------------------------------------------------
// DiscordNotifier
// ---------------------------------------------------------------------------

/// Posts notifications to a Discord webhook.
pub struct DiscordNotifier {
    agent: ureq::Agent,
    webhook_url: Secret,
    repository: String,
    renderer: MessageRenderer,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Secret, timeout: Duration) -> Result<Self, NotifyError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("salvage/", env!("CARGO_PKG_VERSION")))
            .build();
        Ok(Self {
            agent,
            webhook_url,
            repository: String::new(),
            renderer: MessageRenderer::new()?,
        })
    }

    /// Label the repository in message text, e.g. `owner/name@branch`.
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    fn post(&self, message: &WebhookMessage) -> Result<(), NotifyError> {
        match self.send(message) {
            Err(ureq::Error::Status(429, response)) => {
                let wait = retry_after(response).min(MAX_RETRY_WAIT);
                tracing::warn!("webhook rate limited, retrying in {wait:?}");
                std::thread::sleep(wait);
                self.send(message).map(|_| ()).map_err(map_ureq)
            }
            other => other.map(|_| ()).map_err(map_ureq),
        }
    }

    fn send(&self, message: &WebhookMessage) -> Result<ureq::Response, ureq::Error> {
        self.agent
            .post(self.webhook_url.expose())
            .send_json(message)
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let content = self.renderer.render(notification, &self.repository)?;
        let changes = match notification {
            Notification::Changes(report) => report.changes.as_slice(),
            _ => &[],
        };
        let messages = build_messages(content, changes, Utc::now());
        for message in &messages {
            self.post(message)?;
        }
        tracing::info!("sent {} webhook message(s)", messages.len());
        Ok(())
    }
}

/// Seconds to wait from a 429 body (`{"retry_after": 1.5}`) or header.
fn retry_after(response: ureq::Response) -> Duration {
    let header = response
        .header("Retry-After")
        .and_then(|v| v.trim().parse::<f64>().ok());
    let body = response
        .into_json::<Value>()
        .ok()
        .and_then(|v| v.get("retry_after").and_then(Value::as_f64));
    body.or(header)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
}

fn map_ureq(err: ureq::Error) -> NotifyError {
    match err {
        ureq::Error::Status(status, response) => NotifyError::Rejected {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        // The transport error text embeds the URL, which carries the webhook token.
        ureq::Error::Transport(transport) => NotifyError::Network {
            message: transport.kind().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use salvage_core::StackName;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn change(name: &str) -> ChangeRecord {
        ChangeRecord::new(StackName::from(name), ChangeAction::Created, format!("{name}.yaml"))
    }

    #[test]
    fn embed_fields_follow_stack_action_detected_file() {
        let mut record = change("web");
        record.commit_url = Some("https://github.com/acme/backups/commit/c1".into());

        let embed = change_embed(&record, now());

        let names: Vec<_> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Stack", "Action", "Detected", "File"]);
        assert_eq!(
            embed.fields[1].value,
            "[Created](https://github.com/acme/backups/commit/c1)"
        );
        assert_eq!(embed.fields[2].value, format!("<t:{}:R>", now().timestamp()));
        assert_eq!(embed.fields[3].value, "```\nweb.yaml\n```");
        assert!(!embed.fields[3].inline);
        assert_eq!(embed.color, 0x1D63ED);
    }

    #[test]
    fn action_without_commit_is_plain() {
        let embed = change_embed(&change("web"), now());
        assert_eq!(embed.fields[1].value, "Created");
    }

    #[test]
    fn origin_adds_created_and_updated_fields() {
        let mut record = change("web");
        record.origin = Some(StackOrigin {
            created_by: Some("admin".into()),
            updated_at: Some(now()),
            ..Default::default()
        });

        let embed = change_embed(&record, now());

        let names: Vec<_> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Stack", "Action", "Detected", "Created", "Updated", "File"]);
        assert_eq!(embed.fields[3].value, "admin");
    }

    #[test]
    fn embeds_are_chunked_by_ten() {
        let changes: Vec<_> = (0..23).map(|i| change(&format!("s{i}"))).collect();

        let messages = build_messages("summary".into(), &changes, now());

        let sizes: Vec<_> = messages.iter().map(|m| m.embeds.len()).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert_eq!(messages[0].content.as_deref(), Some("summary"));
        assert!(messages[1].content.is_none());
    }

    #[test]
    fn message_without_changes_has_no_embeds_key() {
        let messages = build_messages("nothing".into(), &[], now());
        assert_eq!(messages.len(), 1);
        let json = serde_json::to_value(&messages[0]).expect("json");
        assert!(json.get("embeds").is_none());
        assert_eq!(json["content"], "nothing");
    }

    #[test]
    fn long_summary_is_split_on_line_boundaries() {
        let line = "- web (network): network error calling https://api.github.com/repos/acme/backups/contents/stacks/web.yaml?ref=main: Connection Failed: tls connection init failed";
        let text: String = std::iter::repeat(line).take(30).collect::<Vec<_>>().join("\n");

        let pieces = split_content(&text, MAX_CONTENT_CHARS);

        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.chars().count() <= MAX_CONTENT_CHARS));
        assert!(pieces.iter().all(|p| p.lines().all(|l| l == line)));
        let lines: usize = pieces.iter().map(|p| p.lines().count()).sum();
        assert_eq!(lines, 30);
    }

    #[test]
    fn overlong_line_is_cut() {
        let text = "x".repeat(2500);
        let pieces = split_content(&text, MAX_CONTENT_CHARS);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].chars().count(), MAX_CONTENT_CHARS);
        assert!(pieces[0].ends_with('…'));
    }

    #[test]
    fn summary_overflow_rides_along_with_embed_chunks() {
        let changes: Vec<_> = (0..12).map(|i| change(&format!("s{i}"))).collect();
        let summary = vec!["y".repeat(1500); 3].join("\n");

        let messages = build_messages(summary, &changes, now());

        let shape: Vec<_> = messages
            .iter()
            .map(|m| (m.content.is_some(), m.embeds.len()))
            .collect();
        assert_eq!(shape, vec![(true, 10), (true, 2), (true, 0)]);
    }
}
