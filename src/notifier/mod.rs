//! User-visible event sinks.
//!
//! A [`Notifier`] receives the daemon's informational and error events. The
//! active variant is selected from configuration and hot-swapped on reload:
//!
//! * [`DesktopNotifier`] — delegates to the `notify-send` binary.
//! * [`LogNotifier`] — writes to the process log.
//! * [`NullNotifier`] — drops all events.
//!
//! Delivery is fire-and-forget; a missing or failing notification binary
//! must never stall or fail the pipeline.

use std::process::Stdio;
use std::sync::Arc;

use crate::config::{Config, NotificationType};

/// Sink for user-visible events.
pub trait Notifier: Send + Sync {
    /// Deliver an informational event.
    fn info(&self, title: &str, message: &str);

    /// Deliver an error event.
    fn error(&self, message: &str);

    /// Variant name, for the daemon log.
    fn name(&self) -> &'static str;
}

/// Select the notifier variant for a configuration snapshot.
pub fn for_config(config: &Config) -> Arc<dyn Notifier> {
    if !config.notifications.enabled {
        return Arc::new(NullNotifier);
    }
    match config.notifications.kind {
        NotificationType::Desktop => Arc::new(DesktopNotifier),
        NotificationType::Log => Arc::new(LogNotifier),
        NotificationType::None => Arc::new(NullNotifier),
    }
}

// ---------------------------------------------------------------------------
// DesktopNotifier
// ---------------------------------------------------------------------------

/// Sends desktop notifications through `notify-send`.
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn send(urgency: &'static str, summary: String, body: String) {
        tokio::spawn(async move {
            let result = tokio::process::Command::new("notify-send")
                .arg("-u")
                .arg(urgency)
                .arg("-a")
                .arg("hyprvoice")
                .arg(&summary)
                .arg(&body)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = result {
                log::warn!("notifier: notify-send failed: {e}");
            }
        });
    }
}

impl Notifier for DesktopNotifier {
    fn info(&self, title: &str, message: &str) {
        Self::send("normal", title.to_string(), message.to_string());
    }

    fn error(&self, message: &str) {
        Self::send("critical", "Hyprvoice Error".to_string(), message.to_string());
    }

    fn name(&self) -> &'static str {
        "desktop"
    }
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Writes events to the process log instead of the desktop.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, title: &str, message: &str) {
        log::info!("notify: {title}: {message}");
    }

    fn error(&self, message: &str) {
        log::error!("notify: {message}");
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// NullNotifier
// ---------------------------------------------------------------------------

/// Drops every event.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn info(&self, _title: &str, _message: &str) {}

    fn error(&self, _message: &str) {}

    fn name(&self) -> &'static str {
        "null"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
