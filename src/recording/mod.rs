//! Audio recording collaborator.
//!
//! [`Recorder`] is the contract the pipeline drives; [`PipewireRecorder`] is
//! the production implementation. It spawns `pw-record` writing raw PCM to
//! stdout and chops the stream into opaque byte frames. The pipeline never
//! interprets frame contents — they flow straight to the transcriber.
//!
//! [`MockRecorder`] (available under `#[cfg(test)]`) produces canned frames
//! without touching PipeWire.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::RecordingConfig;

/// Capacity of the recorder error mailbox.
const ERROR_CHANNEL_SIZE: usize = 8;

// ---------------------------------------------------------------------------
// RecordError
// ---------------------------------------------------------------------------

/// Errors from the audio capture collaborator.
#[derive(Debug, Error)]
pub enum RecordError {
    /// `pw-record` could not be spawned (missing binary, bad permissions).
    #[error("failed to start pw-record: {0}")]
    Spawn(std::io::Error),

    /// The capture stream failed mid-session.
    #[error("audio stream error: {0}")]
    Stream(std::io::Error),

    /// `start` was called twice on the same recorder.
    #[error("recorder already started")]
    AlreadyStarted,
}

// ---------------------------------------------------------------------------
// Recorder contract
// ---------------------------------------------------------------------------

/// Audio capture contract consumed by the pipeline.
///
/// `start` returns a frame stream and an error stream; the frame stream ends
/// when the source closes or the cancellation token fires. `stop` is
/// idempotent and releases capture resources.
#[async_trait]
pub trait Recorder: Send {
    async fn start(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<(mpsc::Receiver<Vec<u8>>, mpsc::Receiver<RecordError>), RecordError>;

    async fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// PipewireRecorder
// ---------------------------------------------------------------------------

/// Captures microphone audio by running `pw-record` as a child process.
pub struct PipewireRecorder {
    config: RecordingConfig,
    child: Option<Child>,
}

impl PipewireRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new("pw-record");
        cmd.arg("--rate")
            .arg(self.config.sample_rate.to_string())
            .arg("--channels")
            .arg(self.config.channels.to_string())
            .arg("--format")
            .arg(&self.config.format);
        if !self.config.device.is_empty() {
            cmd.arg("--target").arg(&self.config.device);
        }
        // "-" writes raw samples to stdout.
        cmd.arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Recorder for PipewireRecorder {
    async fn start(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<(mpsc::Receiver<Vec<u8>>, mpsc::Receiver<RecordError>), RecordError> {
        if self.child.is_some() {
            return Err(RecordError::AlreadyStarted);
        }

        let mut child = self.build_command().spawn().map_err(RecordError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecordError::Spawn(std::io::Error::other("pw-record stdout missing")))?;
        let stderr = child.stderr.take();

        let (frame_tx, frame_rx) = mpsc::channel(self.config.channel_buffer_size);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_SIZE);

        // Frame reader: fixed-size chunks of raw PCM until EOF or cancel.
        let buffer_size = self.config.buffer_size;
        let read_cancel = cancel.clone();
        let read_error_tx = error_tx.clone();
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut buf = vec![0u8; buffer_size];
            loop {
                tokio::select! {
                    read = stdout.read(&mut buf) => match read {
                        Ok(0) => break,
                        Ok(n) => {
                            if frame_tx.send(buf[..n].to_vec()).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = read_error_tx.try_send(RecordError::Stream(e));
                            break;
                        }
                    },
                    _ = read_cancel.cancelled() => break,
                }
            }
        });

        // Forward pw-record diagnostics as stream errors.
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::warn!("pw-record: {line}");
                    let _ = error_tx.try_send(RecordError::Stream(std::io::Error::other(line)));
                }
            });
        }

        self.child = Some(child);
        Ok((frame_rx, error_rx))
    }

    async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                log::debug!("recording: kill pw-record: {e}");
            }
            let _ = child.wait().await;
        }
    }
}

// ---------------------------------------------------------------------------
// MockRecorder  (test-only)
// ---------------------------------------------------------------------------

/// Test double that emits a fixed set of frames, then keeps the stream open
/// until cancelled or stopped.
#[cfg(test)]
pub struct MockRecorder {
    frames: Vec<Vec<u8>>,
    fail_start: bool,
    stopped: std::sync::Arc<std::sync::atomic::AtomicBool>,
    stop_count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl MockRecorder {
    pub fn with_frames(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames,
            fail_start: false,
            stopped: Default::default(),
            stop_count: Default::default(),
        }
    }

    /// A mock whose `start` fails immediately.
    pub fn failing() -> Self {
        Self {
            frames: Vec::new(),
            fail_start: true,
            stopped: Default::default(),
            stop_count: Default::default(),
        }
    }

    /// Handle to observe `stop` from the test body.
    pub fn stop_observer(
        &self,
    ) -> (
        std::sync::Arc<std::sync::atomic::AtomicBool>,
        std::sync::Arc<std::sync::atomic::AtomicUsize>,
    ) {
        (self.stopped.clone(), self.stop_count.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl Recorder for MockRecorder {
    async fn start(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<(mpsc::Receiver<Vec<u8>>, mpsc::Receiver<RecordError>), RecordError> {
        if self.fail_start {
            return Err(RecordError::Spawn(std::io::Error::other("mock failure")));
        }

        let (frame_tx, frame_rx) = mpsc::channel(16);
        let (_error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_SIZE);

        let frames = self.frames.clone();
        tokio::spawn(async move {
            for frame in frames {
                if frame_tx.send(frame).await.is_err() {
                    return;
                }
            }
            // Keep the stream open, like a live microphone, until cancel.
            cancel.cancelled().await;
        });

        Ok((frame_rx, error_rx))
    }

    async fn stop(&mut self) {
        self.stopped
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.stop_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordingConfig;

    #[test]
    fn command_includes_configured_parameters() {
        let mut config = RecordingConfig::default();
        config.device = "alsa_input.usb-mic".into();
        let recorder = PipewireRecorder::new(config);

        let cmd = recorder.build_command();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"16000".to_string()));
        assert!(args.contains(&"s16".to_string()));
        assert!(args.contains(&"--target".to_string()));
        assert!(args.contains(&"alsa_input.usb-mic".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn command_omits_target_for_default_device() {
        let recorder = PipewireRecorder::new(RecordingConfig::default());
        let cmd = recorder.build_command();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.contains(&"--target".to_string()));
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let mut recorder = PipewireRecorder::new(RecordingConfig::default());
        recorder.stop().await;
        recorder.stop().await;
    }

    #[tokio::test]
    async fn mock_recorder_emits_frames_then_waits_for_cancel() {
        let cancel = CancellationToken::new();
        let mut recorder = MockRecorder::with_frames(vec![vec![1, 2], vec![3]]);

        let (mut frames, _errors) = recorder.start(cancel.clone()).await.unwrap();
        assert_eq!(frames.recv().await, Some(vec![1, 2]));
        assert_eq!(frames.recv().await, Some(vec![3]));

        cancel.cancel();
        assert_eq!(frames.recv().await, None);
    }
}
