//! # salvage-notify
//!
//! Tells a human what a run did. [`MessageRenderer`] turns a
//! [`Notification`] into text with embedded Tera templates;
//! [`DiscordNotifier`] posts it, with one embed per change, to a Discord
//! webhook.
//!
//! Delivery failures are returned as [`NotifyError`] and never change the
//! outcome of the run that produced them.

pub mod context;
pub mod engine;
pub mod error;
pub mod webhook;

pub use context::{MessageContext, Notification};
pub use engine::MessageRenderer;
pub use error::NotifyError;
pub use webhook::{DiscordNotifier, Notifier};
