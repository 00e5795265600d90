//! Control bus — lockfile and socket endpoint management.
//!
//! The daemon asserts single-instance ownership with a lockfile holding its
//! PID and serves the command protocol on a Unix stream socket next to it,
//! both under the user cache directory:
//!
//! ```text
//! ~/.cache/hyprvoice/hyprvoice.pid   — lockfile (0600)
//! ~/.cache/hyprvoice/control.sock    — command socket
//! ```
//!
//! A lockfile is stale when its contents are unparseable or the referenced
//! process no longer answers a zero-signal probe; stale files are silently
//! cleared so a crashed daemon never wedges the next start.

use std::os::unix::fs::DirBuilderExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::config::AppPaths;

/// Command protocol version, returned by the `v` command.
pub const PROTO_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// BusError
// ---------------------------------------------------------------------------

/// Errors from lockfile and endpoint management.
#[derive(Debug, Error)]
pub enum BusError {
    /// Another daemon instance owns the lockfile.
    #[error("daemon already running with PID {0}")]
    AlreadyRunning(u32),

    /// Filesystem or socket failure.
    #[error("bus io error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Owns the lockfile and socket paths, resolved once per instantiation.
#[derive(Debug, Clone)]
pub struct Bus {
    cache_dir: PathBuf,
    pid_file: PathBuf,
    socket_file: PathBuf,
}

impl Bus {
    /// Resolve paths from the standard user cache directory.
    pub fn new() -> Self {
        let paths = AppPaths::new();
        Self {
            cache_dir: paths.cache_dir,
            pid_file: paths.pid_file,
            socket_file: paths.socket_file,
        }
    }

    /// Resolve paths under an explicit cache directory (useful for tests).
    pub fn with_cache_dir(dir: &Path) -> Self {
        Self {
            cache_dir: dir.to_path_buf(),
            pid_file: dir.join("hyprvoice.pid"),
            socket_file: dir.join("control.sock"),
        }
    }

    /// Path of the control socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_file
    }

    /// Path of the lockfile.
    pub fn pid_path(&self) -> &Path {
        &self.pid_file
    }

    // ── Lockfile ─────────────────────────────────────────────────────────

    /// Check for an existing daemon instance.
    ///
    /// Absent, unparseable and dead-PID lockfiles all return `Ok(())`; the
    /// latter two are removed on the way. Only a live PID fails.
    pub fn check_existing(&self) -> Result<(), BusError> {
        let contents = match std::fs::read_to_string(&self.pid_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("bus: no lockfile, daemon not running");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let pid = match contents.trim().parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => {
                log::warn!("bus: unparseable lockfile, removing stale file");
                self.remove_pid_file();
                return Ok(());
            }
        };

        if process_alive(pid) {
            return Err(BusError::AlreadyRunning(pid));
        }

        log::info!("bus: process {pid} not alive, removing stale lockfile");
        self.remove_pid_file();
        Ok(())
    }

    /// Write the current PID to the lockfile (directory 0700, file 0600).
    pub fn create_pid_file(&self) -> Result<(), BusError> {
        self.ensure_cache_dir()?;
        let pid = std::process::id();
        log::debug!("bus: writing lockfile {} (pid {pid})", self.pid_file.display());

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.pid_file)?;
        write!(file, "{pid}")?;
        Ok(())
    }

    /// Best-effort lockfile removal; absence is not an error.
    pub fn remove_pid_file(&self) {
        if let Err(e) = std::fs::remove_file(&self.pid_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("bus: failed to remove lockfile: {e}");
            }
        }
    }

    // ── Endpoint ─────────────────────────────────────────────────────────

    /// Bind the control socket, unlinking any prior endpoint first so an
    /// unclean shutdown never blocks the next bind.
    pub fn listen(&self) -> Result<UnixListener, BusError> {
        self.ensure_cache_dir()?;
        let _ = std::fs::remove_file(&self.socket_file);
        let listener = UnixListener::bind(&self.socket_file)?;
        Ok(listener)
    }

    /// Open a client connection to the endpoint.
    pub async fn dial(&self) -> Result<UnixStream, BusError> {
        Ok(UnixStream::connect(&self.socket_file).await?)
    }

    /// Remove the socket file after the listener is closed. Best-effort.
    pub fn remove_socket(&self) {
        let _ = std::fs::remove_file(&self.socket_file);
    }

    /// Send a one-line command and return the one-line response verbatim
    /// (including the trailing newline).
    pub async fn send_command(&self, cmd: &str) -> Result<String, BusError> {
        let mut stream = self.dial().await?;
        stream.write_all(format!("{cmd}\n").as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response).await?;
        Ok(response)
    }

    fn ensure_cache_dir(&self) -> Result<(), BusError> {
        if !self.cache_dir.exists() {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(&self.cache_dir)?;
        }
        Ok(())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero-signal probe: does `pid` still exist?
fn process_alive(pid: u32) -> bool {
    // Signal 0 performs permission and existence checks without delivering
    // anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn check_existing_with_no_lockfile_is_clear() {
        let dir = tempdir().unwrap();
        let bus = Bus::with_cache_dir(dir.path());
        assert!(bus.check_existing().is_ok());
    }

    #[test]
    fn unparseable_lockfile_is_cleared() {
        let dir = tempdir().unwrap();
        let bus = Bus::with_cache_dir(dir.path());
        std::fs::write(bus.pid_path(), "not-a-pid").unwrap();

        assert!(bus.check_existing().is_ok());
        assert!(!bus.pid_path().exists());
    }

    #[test]
    fn dead_pid_lockfile_is_cleared() {
        let dir = tempdir().unwrap();
        let bus = Bus::with_cache_dir(dir.path());
        // PIDs near i32::MAX are far beyond any kernel pid_max.
        std::fs::write(bus.pid_path(), format!("{}", i32::MAX)).unwrap();

        assert!(bus.check_existing().is_ok());
        assert!(!bus.pid_path().exists());
    }

    #[test]
    fn live_pid_lockfile_rejects_start() {
        let dir = tempdir().unwrap();
        let bus = Bus::with_cache_dir(dir.path());
        let own_pid = std::process::id();
        std::fs::write(bus.pid_path(), format!("{own_pid}")).unwrap();

        match bus.check_existing() {
            Err(BusError::AlreadyRunning(pid)) => assert_eq!(pid, own_pid),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
    }

    #[test]
    fn create_then_remove_leaves_no_lockfile() {
        let dir = tempdir().unwrap();
        let bus = Bus::with_cache_dir(dir.path());

        bus.create_pid_file().unwrap();
        let contents = std::fs::read_to_string(bus.pid_path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        bus.remove_pid_file();
        assert!(!bus.pid_path().exists());

        // Removing twice is fine.
        bus.remove_pid_file();
    }

    #[tokio::test]
    async fn listen_unlinks_stale_socket() {
        let dir = tempdir().unwrap();
        let bus = Bus::with_cache_dir(dir.path());
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(bus.socket_path(), b"stale").unwrap();

        let listener = bus.listen().expect("bind over stale endpoint");
        drop(listener);
        assert!(bus.socket_path().exists());
    }

    #[tokio::test]
    async fn send_command_round_trip() {
        let dir = tempdir().unwrap();
        let bus = Bus::with_cache_dir(dir.path());
        let listener = bus.listen().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                if reader.read_line(&mut line).await.is_err() {
                    continue;
                }
                let response = match line.as_bytes().first() {
                    Some(b't') => "OK toggled\n",
                    Some(b's') => "STATUS status=idle\n",
                    _ => "ERR unknown\n",
                };
                let mut stream = reader.into_inner();
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        let response = bus.send_command("t").await.unwrap();
        assert_eq!(response, "OK toggled\n");

        let response = bus.send_command("s").await.unwrap();
        assert_eq!(response, "STATUS status=idle\n");
    }
}
