//! Daemon supervisor — wires the bus, config store, notifier and pipeline.
//!
//! # Architecture
//!
//! [`Daemon`] owns the accept loop on the control socket and the mutable
//! trio behind a read-preferring lock: the active pipeline reference, the
//! current notifier, and the runtime mode override. Each accepted
//! connection is served by a short-lived handler implementing the one-line
//! command protocol:
//!
//! | cmd | effect                         | response                    |
//! |-----|--------------------------------|-----------------------------|
//! | `t` | toggle the pipeline            | `OK toggled`                |
//! | `c` | cancel the active session      | `OK cancelled`              |
//! | `s` | report state                   | `STATUS status=<state>`     |
//! | `v` | report protocol version        | `STATUS proto=<ver>`        |
//! | `m` | get/set processing mode        | `MODE mode=…` / `OK mode=…` |
//! | `q` | graceful shutdown              | `OK quitting`               |
//!
//! No blocking operation is performed while holding the state lock; every
//! handler reads state once under lock, drops it, then acts. Toggle races
//! are benign because `Pipeline::run` is idempotent and the action mailbox
//! is bounded.

use std::sync::{Arc, RwLock};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::{Bus, PROTO_VERSION};
use crate::config::{Config, ConfigStore, ProcessingMode};
use crate::notifier::{self, Notifier};
use crate::pipeline::{Action, Pipeline, Status};

type PipelineFactory = Box<dyn Fn(Arc<Config>) -> Pipeline + Send + Sync>;

/// Mutable daemon state, guarded by a read-preferring lock.
struct DaemonState {
    pipeline: Option<Arc<Pipeline>>,
    notifier: Arc<dyn Notifier>,
    mode_override: Option<ProcessingMode>,
}

/// The control daemon: single instance, one active pipeline at a time.
pub struct Daemon {
    bus: Bus,
    config: Arc<ConfigStore>,
    cancel: CancellationToken,
    state: RwLock<DaemonState>,
    factory: PipelineFactory,
    handlers: TaskTracker,
}

impl Daemon {
    /// Build a daemon against the standard paths, creating the default
    /// config file when absent.
    pub fn new() -> anyhow::Result<Arc<Self>> {
        let config = ConfigStore::new().context("failed to create config store")?;
        Ok(Self::assemble(
            Bus::new(),
            config,
            Box::new(|cfg| Pipeline::new(cfg)),
        ))
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        bus: Bus,
        config: Arc<ConfigStore>,
        factory: PipelineFactory,
    ) -> Arc<Self> {
        Self::assemble(bus, config, factory)
    }

    fn assemble(bus: Bus, config: Arc<ConfigStore>, factory: PipelineFactory) -> Arc<Self> {
        let notifier = notifier::for_config(&config.get());
        Arc::new(Self {
            bus,
            config,
            cancel: CancellationToken::new(),
            state: RwLock::new(DaemonState {
                pipeline: None,
                notifier,
                mode_override: None,
            }),
            factory,
            handlers: TaskTracker::new(),
        })
    }

    // ── State accessors ──────────────────────────────────────────────────

    fn status(&self) -> Status {
        let state = self.state.read().unwrap();
        state
            .pipeline
            .as_ref()
            .map(|p| p.status())
            .unwrap_or(Status::Idle)
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        self.state.read().unwrap().notifier.clone()
    }

    fn effective_mode(&self) -> ProcessingMode {
        let state = self.state.read().unwrap();
        state
            .mode_override
            .unwrap_or_else(|| self.config.get().processing.mode)
    }

    fn set_mode_override(&self, mode: ProcessingMode) {
        self.state.write().unwrap().mode_override = Some(mode);
    }

    /// Snapshot for a new session, with the runtime override applied.
    fn session_config(&self) -> Arc<Config> {
        let snapshot = self.config.get();
        let override_mode = self.state.read().unwrap().mode_override;
        match override_mode {
            Some(mode) if mode != snapshot.processing.mode => Arc::new(snapshot.with_mode(mode)),
            _ => snapshot,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Run the daemon until a termination signal or a `q` command.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        self.bus.check_existing()?;

        self.register_reload_callbacks();

        let listener = self.bus.listen().context("failed to bind control socket")?;
        if let Err(e) = self.bus.create_pid_file() {
            self.bus.remove_socket();
            return Err(e).context("failed to create lockfile");
        }

        if let Err(e) = self.config.start_watching() {
            log::warn!("daemon: failed to start config file watching: {e}");
        }

        self.spawn_signal_handler();

        log::info!(
            "daemon: started, listening on {}",
            self.bus.socket_path().display()
        );

        let result = self.accept_loop(listener).await;

        // Teardown mirrors the startup sequence: watcher, lockfile,
        // endpoint. The lockfile exists iff the listener is bound.
        self.config.stop();
        self.bus.remove_pid_file();
        self.bus.remove_socket();
        log::info!("daemon: shut down");
        result
    }

    fn register_reload_callbacks(self: &Arc<Self>) {
        // The watcher fires on its own thread; hop back onto the runtime
        // before touching the pipeline or the notifier.
        let handle = tokio::runtime::Handle::current();

        let daemon = Arc::clone(self);
        let reload_handle = handle.clone();
        self.config.set_on_reload(move || {
            let daemon = Arc::clone(&daemon);
            reload_handle.spawn(async move {
                daemon.on_config_reload().await;
            });
        });

        let daemon = Arc::clone(self);
        self.config.set_on_error(move |err| {
            let message = format!("Config reload failed: {err}");
            let daemon = Arc::clone(&daemon);
            handle.spawn(async move {
                daemon.notifier().error(&message);
            });
        });
    }

    /// Reload callback: the running session keeps its old snapshot, so stop
    /// it, swap the notifier, and tell the user.
    async fn on_config_reload(self: &Arc<Self>) {
        log::info!("daemon: config reloaded, restarting pipeline");
        self.stop_pipeline().await;

        let notifier = notifier::for_config(&self.config.get());
        log::debug!("daemon: using {} notifier", notifier.name());
        self.state.write().unwrap().notifier = notifier;

        self.notifier().info("Hyprvoice", "Config Reloaded");
    }

    fn spawn_signal_handler(self: &Arc<Self>) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let terminated = async {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        log::warn!("daemon: failed to register SIGTERM handler: {e}");
                        std::future::pending::<()>().await;
                    }
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("daemon: received SIGINT, shutting down gracefully");
                }
                _ = terminated => {
                    log::info!("daemon: received SIGTERM, shutting down gracefully");
                }
                _ = cancel.cancelled() => return,
            }
            cancel.cancel();
        });
    }

    async fn accept_loop(self: &Arc<Self>, listener: UnixListener) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let daemon = Arc::clone(self);
                        self.handlers.spawn(async move {
                            daemon.handle(stream).await;
                        });
                    }
                    Err(e) => {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        log::error!("daemon: accept error: {e}");
                        return Err(e).context("accept failed");
                    }
                },
                _ = self.cancel.cancelled() => break,
            }
        }

        log::info!("daemon: shutdown requested, waiting for connections to finish");
        self.handlers.close();
        self.handlers.wait().await;
        Ok(())
    }

    // ── Command protocol ─────────────────────────────────────────────────

    /// Serve one connection: one request line, one response line, close.
    async fn handle(self: &Arc<Self>, stream: UnixStream) {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        let response = match reader.read_line(&mut line).await {
            Ok(_) => self.dispatch(line.trim_end_matches('\n')).await,
            Err(e) => {
                log::warn!("daemon: client read error: {e}");
                format!("ERR read_error: {e}\n")
            }
        };

        let mut stream = reader.into_inner();
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            log::warn!("daemon: failed to write response: {e}");
        }
    }

    /// Execute one protocol line and produce the one-line response.
    async fn dispatch(self: &Arc<Self>, line: &str) -> String {
        let Some(cmd) = line.chars().next() else {
            return "ERR empty\n".to_string();
        };

        match cmd {
            't' => {
                self.toggle().await;
                "OK toggled\n".to_string()
            }
            'c' => {
                self.cancel_pipeline().await;
                "OK cancelled\n".to_string()
            }
            's' => format!("STATUS status={}\n", self.status()),
            'v' => format!("STATUS proto={PROTO_VERSION}\n"),
            'm' => self.dispatch_mode(line[1..].trim()),
            'q' => {
                self.cancel.cancel();
                "OK quitting\n".to_string()
            }
            other => {
                log::warn!("daemon: unknown command: {other}");
                format!("ERR unknown={other}\n")
            }
        }
    }

    /// `m` — get the effective mode, `m:<mode>` — set the runtime override.
    fn dispatch_mode(&self, arg: &str) -> String {
        if arg.is_empty() {
            return format!("MODE mode={}\n", self.effective_mode());
        }
        let Some(value) = arg.strip_prefix(':') else {
            return "ERR invalid_mode_command\n".to_string();
        };
        match ProcessingMode::parse(value) {
            Some(mode) => {
                self.set_mode_override(mode);
                log::info!("daemon: processing mode changed to {mode}");
                format!("OK mode={mode}\n")
            }
            None => format!("ERR invalid_mode={value}\n"),
        }
    }

    // ── Toggle dispatch ──────────────────────────────────────────────────

    /// Advance the state machine: the action taken is indexed by the state
    /// observed once under lock.
    async fn toggle(self: &Arc<Self>) {
        match self.status() {
            Status::Idle => self.start_session().await,

            Status::Recording => {
                self.stop_pipeline().await;
                self.notifier().error("Recording Aborted");
            }

            Status::Transcribing => {
                let action_tx = {
                    let state = self.state.read().unwrap();
                    state.pipeline.as_ref().map(|p| p.action_sender())
                };
                if let Some(action_tx) = action_tx {
                    log::info!("daemon: sending inject action to pipeline");
                    let _ = action_tx.send(Action::Inject).await;
                }
                self.notifier()
                    .info("Hyprvoice", "Recording Ended... Transcribing");
            }

            Status::Injecting => {
                self.stop_pipeline().await;
                self.notifier().error("Injection Aborted");
            }
        }
    }

    async fn start_session(self: &Arc<Self>) {
        // Best-effort: an empty identity means "unknown" and is the
        // injector's to handle.
        let window = capture_active_window().await;
        if window.is_empty() {
            log::info!("daemon: no active window captured, continuing without window tracking");
        } else {
            log::info!("daemon: captured active window {window}");
        }

        let config = self.session_config();
        let pipeline = (self.factory)(config);
        if !window.is_empty() {
            pipeline.set_window_identity(&window);
        }
        pipeline.run(&self.cancel);

        let pipeline = Arc::new(pipeline);
        self.state.write().unwrap().pipeline = Some(Arc::clone(&pipeline));

        self.notifier().info("Hyprvoice", "Recording Started");
        self.spawn_error_monitor(pipeline);
    }

    /// `c` — cancel the active session; a no-op while idle.
    async fn cancel_pipeline(self: &Arc<Self>) {
        if self.status() == Status::Idle {
            log::debug!("daemon: cancel requested but pipeline is idle, ignoring");
            return;
        }
        self.stop_pipeline().await;
        self.notifier().info("Hyprvoice", "Operation Cancelled");
    }

    /// Take the active pipeline out and stop it. A no-op when there is
    /// none; calling twice is equivalent to calling once.
    async fn stop_pipeline(self: &Arc<Self>) {
        let pipeline = self.state.write().unwrap().pipeline.take();
        if let Some(pipeline) = pipeline {
            pipeline.stop().await;
        }
    }

    /// Render session errors to the user for as long as the session (or the
    /// daemon) lives.
    fn spawn_error_monitor(self: &Arc<Self>, pipeline: Arc<Pipeline>) {
        let Some(mut error_rx) = pipeline.take_error_rx() else {
            return;
        };
        let daemon = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    err = error_rx.recv() => match err {
                        Some(err) => daemon.notifier().error(&err.to_string()),
                        None => return,
                    },
                    _ = daemon.cancel.cancelled() => return,
                }
            }
        });
    }
}

/// Ask the compositor for the focused window's opaque identity.
async fn capture_active_window() -> String {
    let output = match tokio::process::Command::new("hyprctl")
        .args(["-j", "activewindow"])
        .output()
        .await
    {
        Ok(output) if output.status.success() => output.stdout,
        Ok(output) => {
            log::debug!("daemon: hyprctl exited with {}", output.status);
            return String::new();
        }
        Err(e) => {
            log::debug!("daemon: failed to run hyprctl: {e}");
            return String::new();
        }
    };

    match serde_json::from_slice::<serde_json::Value>(&output) {
        Ok(json) => json["address"].as_str().unwrap_or_default().to_string(),
        Err(e) => {
            log::debug!("daemon: failed to parse active window JSON: {e}");
            String::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
