//! Application paths resolved via the `dirs` crate.
//!
//! Layout:
//!
//! Cache dir (runtime endpoint + lockfile):
//!   Linux: ~/.cache/hyprvoice/  (or $XDG_CACHE_HOME/hyprvoice/)
//!     control.sock   — command socket
//!     hyprvoice.pid  — single-instance lockfile
//!
//! Config dir:
//!   Linux: ~/.config/hyprvoice/  (or $XDG_CONFIG_HOME/hyprvoice/)
//!     config.toml    — daemon configuration

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for the socket and lockfile.
    pub cache_dir: PathBuf,
    /// Full path to the control socket.
    pub socket_file: PathBuf,
    /// Full path to the lockfile.
    pub pid_file: PathBuf,
    /// Directory for `config.toml`.
    pub config_dir: PathBuf,
    /// Full path to `config.toml`.
    pub config_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "hyprvoice";
    const SOCK_NAME: &'static str = "control.sock";
    const PID_NAME: &'static str = "hyprvoice.pid";
    const CONFIG_NAME: &'static str = "config.toml";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let socket_file = cache_dir.join(Self::SOCK_NAME);
        let pid_file = cache_dir.join(Self::PID_NAME);
        let config_file = config_dir.join(Self::CONFIG_NAME);

        Self {
            cache_dir,
            socket_file,
            pid_file,
            config_dir,
            config_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
