//! Pipeline status, actions, and session errors.
//!
//! The status variable is written only by the session worker (single-writer
//! discipline); the daemon reads it through [`crate::pipeline::Pipeline`].
//! Legal transitions are:
//!
//! ```text
//! Idle ──run()──▶ Recording ──transcriber started──▶ Transcribing
//!                 Transcribing ──Inject action──▶ Injecting ──▶ Idle
//! any active state ──cancel / deadline──▶ Idle
//! ```
//!
//! All other transitions are rejected without side effects.

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// States of the voice pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// No active session.
    #[default]
    Idle,
    /// Microphone capture is starting; audio is being captured.
    Recording,
    /// The transcriber is consuming the live audio stream.
    Transcribing,
    /// The session is finalizing: transcript retrieval and text injection.
    Injecting,
}

impl Status {
    /// Wire name used by the `s` command response.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Recording => "recording",
            Status::Transcribing => "transcribing",
            Status::Injecting => "injecting",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Actions delivered to a running session through its mailbox.
///
/// Cancellation is not an action: it is delivered by cancelling the session
/// handle so it also reaches collaborators mid-suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Finalize the session: stop capture, retrieve the transcript, inject.
    /// Legal only while `Transcribing`; ignored otherwise.
    Inject,
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// A collaborator failure surfaced to the daemon's error monitor.
///
/// Carries a short title for notification headers, a human-readable message,
/// and the rendered underlying cause.
#[derive(Debug)]
pub struct SessionError {
    pub title: &'static str,
    pub message: String,
    pub source: Option<String>,
}

impl SessionError {
    pub fn new(
        title: &'static str,
        message: impl Into<String>,
        source: impl std::fmt::Display,
    ) -> Self {
        Self {
            title,
            message: message.into(),
            source: Some(source.to_string()),
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
