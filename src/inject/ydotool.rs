//! ydotool backend — synthesized keystrokes via the ydotoold daemon.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{binary_on_path, run_checked, Backend, InjectError};

pub struct YdotoolBackend;

impl YdotoolBackend {
    /// Locate the ydotoold socket: `YDOTOOL_SOCKET` first, then the usual
    /// runtime locations.
    fn socket_path() -> Option<std::path::PathBuf> {
        if let Ok(sock) = std::env::var("YDOTOOL_SOCKET") {
            let path = std::path::PathBuf::from(sock);
            if path.exists() {
                return Some(path);
            }
        }

        let mut candidates = Vec::new();
        if let Ok(xdg) = std::env::var("XDG_RUNTIME_DIR") {
            candidates.push(std::path::PathBuf::from(xdg).join(".ydotool_socket"));
        }
        candidates.push(
            std::path::PathBuf::from(format!("/run/user/{}", unsafe { libc::getuid() }))
                .join(".ydotool_socket"),
        );
        candidates.push(std::path::PathBuf::from("/tmp/.ydotool_socket"));

        candidates.into_iter().find(|p| p.exists())
    }
}

#[async_trait]
impl Backend for YdotoolBackend {
    fn name(&self) -> &'static str {
        "ydotool"
    }

    fn available(&self) -> Result<(), InjectError> {
        if !binary_on_path("ydotool") {
            return Err(InjectError::Unavailable {
                backend: self.name(),
                reason: "ydotool not found (install ydotool package)".into(),
            });
        }
        // ydotoold uses a datagram socket we cannot dial; existence of the
        // socket file is the best preflight we have.
        if Self::socket_path().is_none() {
            return Err(InjectError::Unavailable {
                backend: self.name(),
                reason: "ydotoold socket not found - ensure ydotoold is running".into(),
            });
        }
        Ok(())
    }

    async fn inject(
        &self,
        cancel: CancellationToken,
        text: &str,
        _window: &str,
    ) -> Result<(), InjectError> {
        self.available()?;

        let mut cmd = tokio::process::Command::new("ydotool");
        cmd.arg("type").arg("--").arg(text);
        run_checked(self.name(), cancel, &mut cmd).await
    }
}
