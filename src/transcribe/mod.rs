//! Speech transcription collaborator.
//!
//! [`Transcriber`] is the contract the pipeline drives; [`CloudTranscriber`]
//! is the production implementation calling a cloud Whisper API. Frames are
//! consumed as they arrive; the transcript is produced on finalisation
//! (`stop` then `final_text`).
//!
//! [`MockTranscriber`] (available under `#[cfg(test)]`) records received
//! frames and returns a pre-configured transcript.

pub mod cloud;

pub use cloud::CloudTranscriber;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// TranscribeError
// ---------------------------------------------------------------------------

/// Errors from the transcription collaborator.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// HTTP transport or connection error.
    #[error("transcription request failed: {0}")]
    Request(String),

    /// The provider did not answer within the client timeout.
    #[error("transcription request timed out")]
    Timeout,

    /// The provider answered with a non-success status.
    #[error("transcription provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body was not the expected JSON shape.
    #[error("failed to parse transcription response: {0}")]
    Parse(String),

    /// `final_text` was called before `stop` completed.
    #[error("transcriber was not finalized")]
    NotFinalized,

    /// `start` was called twice on the same transcriber.
    #[error("transcriber already started")]
    AlreadyStarted,
}

impl From<reqwest::Error> for TranscribeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranscribeError::Timeout
        } else {
            TranscribeError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber contract
// ---------------------------------------------------------------------------

/// Transcription contract consumed by the pipeline.
///
/// `start` takes ownership of the frame stream and returns an error stream.
/// `stop` requests finalisation (flushing pending audio to the provider);
/// `final_text` returns the full transcript afterwards. An empty recording
/// finalises to an empty transcript, not an error.
#[async_trait]
pub trait Transcriber: Send {
    async fn start(
        &mut self,
        cancel: CancellationToken,
        frames: mpsc::Receiver<Vec<u8>>,
    ) -> Result<mpsc::Receiver<TranscribeError>, TranscribeError>;

    async fn stop(&mut self, cancel: CancellationToken) -> Result<(), TranscribeError>;

    async fn final_text(&mut self) -> Result<String, TranscribeError>;
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// Test double that drains frames into a buffer and returns a canned
/// transcript on finalisation.
#[cfg(test)]
pub struct MockTranscriber {
    text: Result<String, String>,
    fail_start: bool,
    fail_stop: bool,
    received: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
    stopped: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: Ok(text.into()),
            fail_start: false,
            fail_stop: false,
            received: Default::default(),
            stopped: Default::default(),
        }
    }

    /// A mock whose `start` fails immediately.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::ok("")
        }
    }

    /// A mock whose `stop` fails during finalisation.
    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::ok("")
        }
    }

    /// A mock whose `final_text` fails after a clean stop.
    pub fn failing_text(message: impl Into<String>) -> Self {
        Self {
            text: Err(message.into()),
            fail_start: false,
            fail_stop: false,
            received: Default::default(),
            stopped: Default::default(),
        }
    }

    /// Bytes received so far, concatenated across frames.
    pub fn received_bytes(&self) -> std::sync::Arc<std::sync::Mutex<Vec<u8>>> {
        self.received.clone()
    }

    pub fn stop_flag(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.stopped.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transcriber for MockTranscriber {
    async fn start(
        &mut self,
        cancel: CancellationToken,
        mut frames: mpsc::Receiver<Vec<u8>>,
    ) -> Result<mpsc::Receiver<TranscribeError>, TranscribeError> {
        if self.fail_start {
            return Err(TranscribeError::Request("mock start failure".into()));
        }

        let (_error_tx, error_rx) = mpsc::channel(8);
        let received = self.received.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = frames.recv() => match frame {
                        Some(frame) => received.lock().unwrap().extend_from_slice(&frame),
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                }
            }
        });
        Ok(error_rx)
    }

    async fn stop(&mut self, _cancel: CancellationToken) -> Result<(), TranscribeError> {
        self.stopped
            .store(true, std::sync::atomic::Ordering::SeqCst);
        if self.fail_stop {
            return Err(TranscribeError::Request("mock stop failure".into()));
        }
        Ok(())
    }

    async fn final_text(&mut self) -> Result<String, TranscribeError> {
        match &self.text {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(TranscribeError::Parse(message.clone())),
        }
    }
}
