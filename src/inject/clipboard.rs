//! Clipboard backend — `wl-copy` plus best-effort focus-and-paste.
//!
//! The copy itself is the success criterion. When a window identity was
//! captured at session start, the backend additionally tries to refocus that
//! window through the compositor and send Ctrl+Shift+V (which pastes in both
//! terminals and most GUI apps); failures in that half degrade to copy-only
//! and never fail the injection.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::wtype::check_wayland_session;
use super::{binary_on_path, run_checked, Backend, InjectError};

/// Settle time between refocusing the window and sending the paste chord.
const FOCUS_SETTLE: Duration = Duration::from_millis(100);

pub struct ClipboardBackend;

impl ClipboardBackend {
    async fn copy(&self, cancel: CancellationToken, text: &str) -> Result<(), InjectError> {
        let mut child = tokio::process::Command::new("wl-copy")
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| InjectError::Command {
                backend: self.name(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| InjectError::Command {
                    backend: self.name(),
                    reason: e.to_string(),
                })?;
            drop(stdin);
        }

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(InjectError::Command {
                    backend: self.name(),
                    reason: format!("wl-copy exited with {status}"),
                }),
                Err(e) => Err(InjectError::Command {
                    backend: self.name(),
                    reason: e.to_string(),
                }),
            },
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                Err(InjectError::Cancelled)
            }
        }
    }

    async fn focus_window(
        &self,
        cancel: CancellationToken,
        window: &str,
    ) -> Result<(), InjectError> {
        let mut cmd = tokio::process::Command::new("hyprctl");
        cmd.arg("dispatch").arg("focuswindow").arg(format!("address:{window}"));
        run_checked(self.name(), cancel, &mut cmd).await
    }

    /// Ctrl+Shift+V via wtype, falling back to ydotool.
    async fn paste(&self, cancel: CancellationToken) -> Result<(), InjectError> {
        if binary_on_path("wtype") {
            let mut cmd = tokio::process::Command::new("wtype");
            cmd.args(["-M", "ctrl", "-M", "shift", "v", "-m", "shift", "-m", "ctrl"]);
            match run_checked(self.name(), cancel.clone(), &mut cmd).await {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!("clipboard: wtype paste failed: {e}, trying ydotool"),
            }
        }

        if binary_on_path("ydotool") {
            let mut cmd = tokio::process::Command::new("ydotool");
            cmd.args(["key", "ctrl+shift+v"]);
            return run_checked(self.name(), cancel, &mut cmd).await;
        }

        Err(InjectError::Unavailable {
            backend: self.name(),
            reason: "neither wtype nor ydotool available for pasting".into(),
        })
    }
}

#[async_trait]
impl Backend for ClipboardBackend {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn available(&self) -> Result<(), InjectError> {
        if !binary_on_path("wl-copy") {
            return Err(InjectError::Unavailable {
                backend: self.name(),
                reason: "wl-copy not found (install wl-clipboard)".into(),
            });
        }
        check_wayland_session(self.name())
    }

    async fn inject(
        &self,
        cancel: CancellationToken,
        text: &str,
        window: &str,
    ) -> Result<(), InjectError> {
        self.available()?;
        self.copy(cancel.clone(), text).await?;

        // Past this point the text is on the clipboard, which counts as
        // success; focus + paste is opportunistic.
        if !window.is_empty() {
            match self.focus_window(cancel.clone(), window).await {
                Ok(()) => {
                    tokio::time::sleep(FOCUS_SETTLE).await;
                    if let Err(e) = self.paste(cancel).await {
                        log::warn!("clipboard: paste failed: {e}, text is still in clipboard");
                    }
                }
                Err(e) => {
                    log::warn!(
                        "clipboard: failed to focus window {window}: {e}, \
                         continuing with clipboard copy only"
                    );
                }
            }
        }

        Ok(())
    }
}
