//! hyprvoice — voice-powered typing daemon for Wayland/Hyprland.
//!
//! A hotkey (bound to `hyprvoice toggle` in the compositor) drives a
//! single-session pipeline: microphone capture through PipeWire, cloud
//! speech-to-text, optional LLM cleanup, and text injection into the
//! focused window. A thin CLI sends one-line commands to the daemon over a
//! Unix socket.
//!
//! # Modules
//!
//! * [`bus`] — lockfile + socket endpoint management, client helpers.
//! * [`config`] — TOML settings, validation, atomic snapshots, hot reload.
//! * [`daemon`] — supervisor: accept loop, command protocol, toggle logic.
//! * [`pipeline`] — the `Idle → Recording → Transcribing → Injecting`
//!   session state machine.
//! * [`recording`] / [`transcribe`] / [`inject`] — collaborator contracts
//!   and their production implementations.
//! * [`llm`] — post-transcription transcript cleanup.
//! * [`notifier`] — desktop / log / null event sinks.
//! * [`wizard`] — interactive `configure` subcommand.

pub mod bus;
pub mod config;
pub mod daemon;
pub mod inject;
pub mod llm;
pub mod notifier;
pub mod pipeline;
pub mod recording;
pub mod transcribe;
pub mod wizard;

pub use bus::{Bus, PROTO_VERSION};
pub use config::{Config, ConfigStore, ProcessingMode};
pub use daemon::Daemon;
pub use pipeline::{Pipeline, Status};
