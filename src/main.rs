//! Command-line entry point — voice-powered typing for Wayland/Hyprland.
//!
//! `serve` runs the control daemon; every other subcommand connects to the
//! daemon's socket, sends its single-character command, prints the response
//! verbatim, and exits. Exit code is non-zero on connection or protocol
//! failure.

use clap::{Parser, Subcommand};
use hyprvoice::bus::Bus;
use hyprvoice::daemon::Daemon;
use hyprvoice::wizard;

#[derive(Parser)]
#[command(name = "hyprvoice")]
#[command(about = "Voice-powered typing for Wayland/Hyprland")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Serve,

    /// Toggle recording on/off
    Toggle,

    /// Cancel current operation
    Cancel,

    /// Get current recording status
    Status,

    /// Stop the daemon
    Stop,

    /// Print application version
    Version,

    /// Get or set the post-transcription processing mode
    ///
    /// With no argument, displays the current mode. Modes:
    ///   raw  - direct transcription output (default)
    ///   llm  - clean up transcription using AI
    Mode {
        /// "raw" or "llm"
        mode: Option<String>,
    },

    /// Interactive configuration setup
    Configure,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => Daemon::new()?.run().await,
        Commands::Toggle => send_command("t").await,
        Commands::Cancel => send_command("c").await,
        Commands::Status => send_command("s").await,
        Commands::Stop => send_command("q").await,
        Commands::Version => {
            println!("hyprvoice {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Mode { mode } => match mode {
            None => send_command("m").await,
            Some(mode) => {
                if mode != "raw" && mode != "llm" {
                    anyhow::bail!("invalid mode: {mode} (must be 'raw' or 'llm')");
                }
                send_command(&format!("m:{mode}")).await
            }
        },
        Commands::Configure => wizard::run(),
    }
}

/// Send one command to the daemon and print its response verbatim.
async fn send_command(cmd: &str) -> anyhow::Result<()> {
    let response = Bus::new()
        .send_command(cmd)
        .await
        .map_err(|e| anyhow::anyhow!("failed to reach daemon: {e}"))?;
    print!("{response}");
    Ok(())
}
