//! Text injection module — delivers the transcript to the focused window.
//!
//! # Overview
//!
//! Injection runs an ordered fallback chain of backends from configuration:
//!
//! 1. **ydotool** — synthesized keystrokes via the ydotoold daemon; most
//!    compatible with Chromium/Electron apps.
//! 2. **wtype** — native Wayland virtual-keyboard typing.
//! 3. **clipboard** — `wl-copy`, then best-effort focus + paste via the
//!    compositor.
//!
//! Each backend is bounded by its per-backend timeout; the first success
//! wins, and the final error wraps the last backend failure when all fail.

pub mod clipboard;
pub mod wtype;
pub mod ydotool;

pub use clipboard::ClipboardBackend;
pub use wtype::WtypeBackend;
pub use ydotool::YdotoolBackend;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{InjectionBackend, InjectionConfig};

// ---------------------------------------------------------------------------
// InjectError
// ---------------------------------------------------------------------------

/// All errors that can surface during text injection.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Rejected before any backend ran.
    #[error("cannot inject empty text")]
    EmptyText,

    /// A backend's binary or session environment is missing.
    #[error("{backend} unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    /// A backend's child process failed.
    #[error("{backend} failed: {reason}")]
    Command {
        backend: &'static str,
        reason: String,
    },

    /// A backend did not finish within its configured timeout.
    #[error("{backend} timed out after {timeout:?}")]
    Timeout {
        backend: &'static str,
        timeout: Duration,
    },

    /// Every configured backend failed; carries the last failure.
    #[error("all injection backends failed, last error: {0}")]
    AllBackendsFailed(Box<InjectError>),

    /// The session was cancelled mid-injection.
    #[error("injection cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// A single text injection method.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap preflight: binary on `PATH`, session environment present.
    fn available(&self) -> Result<(), InjectError>;

    /// Deliver `text`; `window` is the opaque compositor identity captured at
    /// session start (empty = unknown).
    async fn inject(
        &self,
        cancel: CancellationToken,
        text: &str,
        window: &str,
    ) -> Result<(), InjectError>;
}

// ---------------------------------------------------------------------------
// TextInjector contract + Injector
// ---------------------------------------------------------------------------

/// Injection contract consumed by the pipeline.
#[async_trait]
pub trait TextInjector: Send + Sync {
    async fn inject(
        &self,
        cancel: CancellationToken,
        text: &str,
        window: &str,
    ) -> Result<(), InjectError>;
}

/// Ordered backend chain built from configuration.
pub struct Injector {
    config: InjectionConfig,
    backends: Vec<(InjectionBackend, Box<dyn Backend>)>,
}

impl Injector {
    /// Build the backend chain in configured order. An empty configured
    /// chain degrades to clipboard-only.
    pub fn from_config(config: &InjectionConfig) -> Self {
        let mut backends: Vec<(InjectionBackend, Box<dyn Backend>)> = config
            .backends
            .iter()
            .map(|&kind| {
                let backend: Box<dyn Backend> = match kind {
                    InjectionBackend::Ydotool => Box::new(YdotoolBackend),
                    InjectionBackend::Wtype => Box::new(WtypeBackend),
                    InjectionBackend::Clipboard => Box::new(ClipboardBackend),
                };
                (kind, backend)
            })
            .collect();

        if backends.is_empty() {
            log::warn!("inject: no backends configured, defaulting to clipboard");
            backends.push((InjectionBackend::Clipboard, Box::new(ClipboardBackend)));
        }

        Self {
            config: config.clone(),
            backends,
        }
    }

    #[cfg(test)]
    fn with_backends(
        config: InjectionConfig,
        backends: Vec<(InjectionBackend, Box<dyn Backend>)>,
    ) -> Self {
        Self { config, backends }
    }
}

#[async_trait]
impl TextInjector for Injector {
    /// Try each backend in order with its per-backend timeout; first success
    /// wins.
    async fn inject(
        &self,
        cancel: CancellationToken,
        text: &str,
        window: &str,
    ) -> Result<(), InjectError> {
        if text.is_empty() {
            return Err(InjectError::EmptyText);
        }

        let mut last_err: Option<InjectError> = None;
        for (kind, backend) in &self.backends {
            let timeout = self.config.timeout_for(*kind);
            let attempt = tokio::time::timeout(timeout, backend.inject(cancel.clone(), text, window));

            let result = match attempt.await {
                Ok(result) => result,
                Err(_elapsed) => Err(InjectError::Timeout {
                    backend: backend.name(),
                    timeout,
                }),
            };

            match result {
                Ok(()) => {
                    log::info!("inject: success via {}", backend.name());
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("inject: {} failed: {e}, trying next backend", backend.name());
                    last_err = Some(e);
                }
            }
        }

        Err(InjectError::AllBackendsFailed(Box::new(
            last_err.unwrap_or(InjectError::EmptyText),
        )))
    }
}

/// Run a prepared command under the session cancellation token, mapping
/// failures into backend errors. Shared by the concrete backends.
pub(crate) async fn run_checked(
    backend: &'static str,
    cancel: CancellationToken,
    cmd: &mut tokio::process::Command,
) -> Result<(), InjectError> {
    let mut child = cmd.spawn().map_err(|e| InjectError::Command {
        backend,
        reason: e.to_string(),
    })?;

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(InjectError::Command {
                backend,
                reason: format!("exited with {status}"),
            }),
            Err(e) => Err(InjectError::Command {
                backend,
                reason: e.to_string(),
            }),
        },
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            Err(InjectError::Cancelled)
        }
    }
}

/// Preflight helper: is `binary` somewhere on `PATH`?
pub(crate) fn binary_on_path(binary: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(binary).is_file())
}

// ---------------------------------------------------------------------------
// MockInjector  (test-only)
// ---------------------------------------------------------------------------

/// Test double that records every injection call.
#[cfg(test)]
pub struct MockInjector {
    succeed: bool,
    calls: std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

#[cfg(test)]
impl MockInjector {
    pub fn ok() -> Self {
        Self {
            succeed: true,
            calls: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            calls: Default::default(),
        }
    }

    /// Recorded `(text, window)` pairs.
    pub fn calls(&self) -> std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>> {
        self.calls.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl TextInjector for MockInjector {
    async fn inject(
        &self,
        _cancel: CancellationToken,
        text: &str,
        window: &str,
    ) -> Result<(), InjectError> {
        if text.is_empty() {
            return Err(InjectError::EmptyText);
        }
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), window.to_string()));
        if self.succeed {
            Ok(())
        } else {
            Err(InjectError::Command {
                backend: "mock",
                reason: "scripted failure".into(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
