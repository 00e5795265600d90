//! wtype backend — native Wayland virtual-keyboard typing.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{binary_on_path, run_checked, Backend, InjectError};

pub struct WtypeBackend;

/// Session environment both wtype and wl-copy need.
pub(crate) fn check_wayland_session(backend: &'static str) -> Result<(), InjectError> {
    if std::env::var_os("WAYLAND_DISPLAY").is_none() {
        return Err(InjectError::Unavailable {
            backend,
            reason: "WAYLAND_DISPLAY not set - requires a Wayland session".into(),
        });
    }
    if std::env::var_os("XDG_RUNTIME_DIR").is_none() {
        return Err(InjectError::Unavailable {
            backend,
            reason: "XDG_RUNTIME_DIR not set - requires a proper session environment".into(),
        });
    }
    Ok(())
}

#[async_trait]
impl Backend for WtypeBackend {
    fn name(&self) -> &'static str {
        "wtype"
    }

    fn available(&self) -> Result<(), InjectError> {
        if !binary_on_path("wtype") {
            return Err(InjectError::Unavailable {
                backend: self.name(),
                reason: "wtype not found (install wtype package)".into(),
            });
        }
        check_wayland_session(self.name())
    }

    async fn inject(
        &self,
        cancel: CancellationToken,
        text: &str,
        _window: &str,
    ) -> Result<(), InjectError> {
        self.available()?;

        let mut cmd = tokio::process::Command::new("wtype");
        cmd.arg("--").arg(text);
        run_checked(self.name(), cancel, &mut cmd).await
    }
}
