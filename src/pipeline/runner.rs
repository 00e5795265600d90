//! Pipeline — one cancellable session from `Idle` back to `Idle`.
//!
//! # Session flow
//!
//! ```text
//! run(parent)
//!   └─▶ derive session token (deadline = recording timeout), spawn worker
//!         worker: Recording  — recorder.start → frame + error streams
//!                 Transcribing — transcriber.start(relayed frames)
//!                 supervision loop:
//!                   frames   → relay to transcriber (observes end-of-stream)
//!                   errors   → forwarded into the error mailbox
//!                   Inject   → Injecting: finalize transcript, (LLM), inject
//!                   cancel/deadline → abort without finalization
//!                 every exit → status Idle, running flag cleared
//! ```
//!
//! The status variable is written only by the session worker; the daemon
//! reads it through [`Pipeline::status`]. `run` is idempotent, the action
//! mailbox is bounded at 1, and the error mailbox at 10 (overflow drops the
//! new error with a log record).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ProcessingMode};
use crate::inject::{Injector, TextInjector};
use crate::llm::{self, Processor};
use crate::recording::{PipewireRecorder, Recorder};
use crate::transcribe::{CloudTranscriber, Transcriber};

use super::state::{Action, SessionError, Status};

const ACTION_MAILBOX_SIZE: usize = 1;
const ERROR_MAILBOX_SIZE: usize = 10;

/// The collaborators a session consumes, built from its config snapshot.
struct Collaborators {
    recorder: Box<dyn Recorder>,
    transcriber: Box<dyn Transcriber>,
    injector: Arc<dyn TextInjector>,
    processor: Option<Box<dyn Processor>>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A single recording→transcription→injection session.
///
/// Created lazily by the daemon on toggle-from-idle, bound to one immutable
/// configuration snapshot, destroyed when the session returns to `Idle`.
pub struct Pipeline {
    config: Arc<Config>,
    status: Arc<Mutex<Status>>,
    window_identity: Mutex<String>,
    running: Arc<AtomicBool>,
    action_tx: mpsc::Sender<Action>,
    action_rx: Mutex<Option<mpsc::Receiver<Action>>>,
    error_tx: mpsc::Sender<SessionError>,
    error_rx: Mutex<Option<mpsc::Receiver<SessionError>>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    collaborators: Mutex<Option<Collaborators>>,
}

impl Pipeline {
    /// Build a pipeline with production collaborators from a configuration
    /// snapshot. The pipeline starts in `Idle`.
    pub fn new(config: Arc<Config>) -> Self {
        let processor = match config.processing.mode {
            ProcessingMode::Llm => match llm::for_config(&config.llm) {
                Ok(processor) => Some(processor),
                Err(e) => {
                    log::warn!("pipeline: no LLM processor available: {e}");
                    None
                }
            },
            ProcessingMode::Raw => None,
        };

        let collaborators = Collaborators {
            recorder: Box::new(PipewireRecorder::new(config.recording.clone())),
            transcriber: Box::new(CloudTranscriber::from_config(&config)),
            injector: Arc::new(Injector::from_config(&config.injection)),
            processor,
        };
        Self::assemble(config, collaborators)
    }

    #[cfg(test)]
    pub(crate) fn with_collaborators(
        config: Arc<Config>,
        recorder: Box<dyn Recorder>,
        transcriber: Box<dyn Transcriber>,
        injector: Arc<dyn TextInjector>,
        processor: Option<Box<dyn Processor>>,
    ) -> Self {
        Self::assemble(
            config,
            Collaborators {
                recorder,
                transcriber,
                injector,
                processor,
            },
        )
    }

    fn assemble(config: Arc<Config>, collaborators: Collaborators) -> Self {
        let (action_tx, action_rx) = mpsc::channel(ACTION_MAILBOX_SIZE);
        let (error_tx, error_rx) = mpsc::channel(ERROR_MAILBOX_SIZE);
        Self {
            config,
            status: Arc::new(Mutex::new(Status::Idle)),
            window_identity: Mutex::new(String::new()),
            running: Arc::new(AtomicBool::new(false)),
            action_tx,
            action_rx: Mutex::new(Some(action_rx)),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
            cancel: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
            collaborators: Mutex::new(Some(collaborators)),
        }
    }

    // ── Observation & plumbing ───────────────────────────────────────────

    /// Current session status. Torn reads are impossible; the worker is the
    /// only writer.
    pub fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    /// Sender half of the action mailbox (capacity 1).
    pub fn action_sender(&self) -> mpsc::Sender<Action> {
        self.action_tx.clone()
    }

    /// Take the error mailbox receiver; the daemon's error monitor consumes
    /// it. Subsequent calls return `None`.
    pub fn take_error_rx(&self) -> Option<mpsc::Receiver<SessionError>> {
        self.error_rx.lock().unwrap().take()
    }

    /// Record the opaque window identity captured at session start.
    pub fn set_window_identity(&self, identity: impl Into<String>) {
        *self.window_identity.lock().unwrap() = identity.into();
    }

    pub fn window_identity(&self) -> String {
        self.window_identity.lock().unwrap().clone()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Start the session worker. Idempotent: a second call while running is
    /// a no-op.
    pub fn run(&self, parent: &CancellationToken) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("pipeline: already running, ignoring run() call");
            return;
        }

        let Some(collaborators) = self.collaborators.lock().unwrap().take() else {
            log::warn!("pipeline: session already consumed, ignoring run() call");
            self.running.store(false, Ordering::SeqCst);
            return;
        };
        let Some(action_rx) = self.action_rx.lock().unwrap().take() else {
            log::warn!("pipeline: action mailbox already consumed");
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        let cancel = parent.child_token();
        *self.cancel.lock().unwrap() = Some(cancel.clone());

        // Absolute deadline: reaching it is equivalent to external cancel.
        let timeout = self.config.recording.timeout();
        let deadline_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    log::info!("pipeline: recording timeout reached, cancelling session");
                    deadline_cancel.cancel();
                }
                _ = deadline_cancel.cancelled() => {}
            }
        });

        let session = Session {
            status: Arc::clone(&self.status),
            error_tx: self.error_tx.clone(),
            cancel,
            window: self.window_identity(),
            mode: self.config.processing.mode,
            frame_capacity: self.config.recording.channel_buffer_size,
        };

        let status = Arc::clone(&self.status);
        let running = Arc::clone(&self.running);
        let cancel_slot = Arc::clone(&self.cancel);
        let handle = tokio::spawn(async move {
            session.run(collaborators, action_rx).await;
            // Every exit path funnels through here before the handle
            // resolves: state Idle, running flag cleared, token released
            // (which also unwinds the deadline task).
            *status.lock().unwrap() = Status::Idle;
            running.store(false, Ordering::SeqCst);
            if let Some(token) = cancel_slot.lock().unwrap().take() {
                token.cancel();
            }
        });
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Cancel the session and wait for the worker to finish. Idempotent;
    /// a pipeline that never ran returns immediately.
    pub async fn stop(&self) {
        let cancel = self.cancel.lock().unwrap().clone();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Session worker
// ---------------------------------------------------------------------------

struct Session {
    status: Arc<Mutex<Status>>,
    error_tx: mpsc::Sender<SessionError>,
    cancel: CancellationToken,
    window: String,
    mode: ProcessingMode,
    frame_capacity: usize,
}

impl Session {
    fn set_status(&self, status: Status) {
        *self.status.lock().unwrap() = status;
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    fn send_error(&self, err: SessionError) {
        send_error(&self.error_tx, err);
    }

    async fn run(
        &self,
        mut collab: Collaborators,
        mut action_rx: mpsc::Receiver<Action>,
    ) {
        log::info!("pipeline: starting recording");
        self.set_status(Status::Recording);

        let (frame_rx, recorder_errors) = match collab.recorder.start(self.cancel.clone()).await {
            Ok(streams) => streams,
            Err(e) => {
                log::error!("pipeline: recording error: {e}");
                self.send_error(SessionError::new(
                    "Recording Error",
                    "Failed to start recording",
                    e,
                ));
                return;
            }
        };
        forward_errors(
            recorder_errors,
            self.error_tx.clone(),
            "Recording Error",
            "Recording stream error",
        );

        // The transcriber consumes frames through a relay so the supervision
        // loop can observe end-of-stream without competing for them.
        let (relay_tx, relay_rx) = mpsc::channel::<Vec<u8>>(self.frame_capacity);
        let transcriber_errors = match collab
            .transcriber
            .start(self.cancel.clone(), relay_rx)
            .await
        {
            Ok(errors) => errors,
            Err(e) => {
                log::error!("pipeline: transcriber error: {e}");
                collab.recorder.stop().await;
                self.send_error(SessionError::new(
                    "Transcription Error",
                    "Failed to start transcriber",
                    e,
                ));
                return;
            }
        };
        forward_errors(
            transcriber_errors,
            self.error_tx.clone(),
            "Transcription Error",
            "Transcription processing error",
        );

        log::info!("pipeline: transcriber started");
        self.set_status(Status::Transcribing);

        let mut frames = Some(frame_rx);
        let mut relay = Some(relay_tx);
        loop {
            tokio::select! {
                frame = recv_or_pending(&mut frames) => match frame {
                    Some(frame) => {
                        if let Some(tx) = &relay {
                            // Blocking here applies capture backpressure, but
                            // must stay responsive to cancellation.
                            tokio::select! {
                                _ = tx.send(frame) => {}
                                _ = self.cancel.cancelled() => {}
                            }
                        }
                    }
                    None => {
                        log::debug!("pipeline: audio stream ended");
                        relay = None;
                    }
                },

                action = action_rx.recv() => {
                    if let Some(Action::Inject) = action {
                        if self.handle_inject(&mut collab).await {
                            return;
                        }
                    }
                }

                _ = self.cancel.cancelled() => {
                    log::info!("pipeline: session cancelled");
                    collab.recorder.stop().await;
                    // No finalization: the transcriber's tasks unwind
                    // through the shared token.
                    return;
                }
            }
        }
    }

    /// Handle the `Inject` action. Returns `true` when the session is over,
    /// `false` when the action was ignored.
    async fn handle_inject(&self, collab: &mut Collaborators) -> bool {
        if self.status() != Status::Transcribing {
            log::info!("pipeline: inject action received outside transcribing, ignoring");
            return false;
        }

        log::info!("pipeline: inject action received, finalizing transcription");
        self.set_status(Status::Injecting);

        collab.recorder.stop().await;

        if let Err(e) = collab.transcriber.stop(self.cancel.clone()).await {
            self.send_error(SessionError::new(
                "Transcription Error",
                "Failed to stop transcriber during injection",
                e,
            ));
            return true;
        }

        let text = match collab.transcriber.final_text().await {
            Ok(text) => text,
            Err(e) => {
                self.send_error(SessionError::new(
                    "Transcription Error",
                    "Failed to retrieve transcription",
                    e,
                ));
                return true;
            }
        };
        log::info!("pipeline: final transcription text: {text:?}");

        let text = match (&self.mode, &collab.processor) {
            (ProcessingMode::Llm, Some(processor)) => {
                match processor.process(self.cancel.clone(), &text).await {
                    Ok(cleaned) => cleaned,
                    Err(e) => {
                        self.send_error(SessionError::new(
                            "Processing Error",
                            "LLM cleanup failed, injecting raw transcript",
                            e,
                        ));
                        text
                    }
                }
            }
            _ => text,
        };

        match collab
            .injector
            .inject(self.cancel.clone(), &text, &self.window)
            .await
        {
            Ok(()) => log::info!("pipeline: text injection completed"),
            Err(e) => {
                self.send_error(SessionError::new(
                    "Injection Error",
                    "Failed to inject text",
                    e,
                ));
            }
        }

        true
    }
}

/// Receive from an optional channel; a closed channel yields `None` once and
/// then parks forever so `select!` stops polling it.
async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(receiver) => match receiver.recv().await {
            Some(value) => Some(value),
            None => {
                *rx = None;
                None
            }
        },
        None => std::future::pending().await,
    }
}

/// Forward a collaborator error stream into the session error mailbox.
fn forward_errors<E>(
    mut rx: mpsc::Receiver<E>,
    error_tx: mpsc::Sender<SessionError>,
    title: &'static str,
    message: &'static str,
) where
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(e) = rx.recv().await {
            send_error(&error_tx, SessionError::new(title, message, e));
        }
    });
}

fn send_error(tx: &mpsc::Sender<SessionError>, err: SessionError) {
    match tx.try_send(err) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            log::warn!("pipeline: error mailbox full, dropping error: {dropped}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::MockInjector;
    use crate::recording::{MockRecorder, RecordError, Recorder};
    use crate::transcribe::MockTranscriber;
    use async_trait::async_trait;
    use std::time::Duration;

    fn config() -> Arc<Config> {
        let mut cfg = Config::default();
        cfg.transcription.api_key = "test-key".into();
        Arc::new(cfg)
    }

    fn llm_config() -> Arc<Config> {
        let mut cfg = Config::default();
        cfg.transcription.api_key = "test-key".into();
        cfg.processing.mode = ProcessingMode::Llm;
        cfg.llm.api_key = "test-key".into();
        Arc::new(cfg)
    }

    async fn wait_for_status(pipeline: &Pipeline, want: Status) {
        for _ in 0..400 {
            if pipeline.status() == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "timed out waiting for status {want}, still {}",
            pipeline.status()
        );
    }

    fn frames() -> Vec<Vec<u8>> {
        vec![vec![0u8; 320], vec![1u8; 320]]
    }

    // ---- happy path ---

    #[tokio::test]
    async fn full_session_injects_final_transcript_once() {
        let recorder = MockRecorder::with_frames(frames());
        let (rec_stopped, _) = recorder.stop_observer();
        let transcriber = MockTranscriber::ok("hello world");
        let received = transcriber.received_bytes();
        let injector = Arc::new(MockInjector::ok());
        let calls = injector.calls();

        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(recorder),
            Box::new(transcriber),
            injector,
            None,
        );
        pipeline.set_window_identity("0xdeadbeef");

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;

        // Let the relay deliver every recorded byte before finalizing.
        for _ in 0..400 {
            if received.lock().unwrap().len() == 640 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(received.lock().unwrap().len(), 640);

        pipeline.action_sender().send(Action::Inject).await.unwrap();
        wait_for_status(&pipeline, Status::Idle).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("hello world".to_string(), "0xdeadbeef".to_string()));
        assert!(rec_stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn run_is_idempotent() {
        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(MockRecorder::with_frames(frames())),
            Box::new(MockTranscriber::ok("x")),
            Arc::new(MockInjector::ok()),
            None,
        );

        let root = CancellationToken::new();
        pipeline.run(&root);
        pipeline.run(&root); // second call: no-op
        wait_for_status(&pipeline, Status::Transcribing).await;

        pipeline.stop().await;
        assert_eq!(pipeline.status(), Status::Idle);

        // A finished session cannot be restarted.
        pipeline.run(&root);
        assert_eq!(pipeline.status(), Status::Idle);
    }

    // ---- cancellation ---

    #[tokio::test]
    async fn stop_cancels_session_without_injecting() {
        let recorder = MockRecorder::with_frames(frames());
        let (rec_stopped, _) = recorder.stop_observer();
        let injector = Arc::new(MockInjector::ok());
        let calls = injector.calls();

        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(recorder),
            Box::new(MockTranscriber::ok("never injected")),
            injector,
            None,
        );

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;

        pipeline.stop().await;
        assert_eq!(pipeline.status(), Status::Idle);
        assert!(calls.lock().unwrap().is_empty());
        assert!(rec_stopped.load(Ordering::SeqCst));

        // Stopping twice is equivalent to stopping once.
        pipeline.stop().await;
        assert_eq!(pipeline.status(), Status::Idle);
    }

    #[tokio::test]
    async fn parent_cancellation_tears_down_the_session() {
        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(MockRecorder::with_frames(frames())),
            Box::new(MockTranscriber::ok("x")),
            Arc::new(MockInjector::ok()),
            None,
        );

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;

        root.cancel();
        wait_for_status(&pipeline, Status::Idle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_session_without_a_session_error() {
        let mut cfg = Config::default();
        cfg.transcription.api_key = "test-key".into();
        cfg.recording.timeout_secs = 1;
        let pipeline = Pipeline::with_collaborators(
            Arc::new(cfg),
            Box::new(MockRecorder::with_frames(Vec::new())),
            Box::new(MockTranscriber::ok("x")),
            Arc::new(MockInjector::ok()),
            None,
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;

        // The paused clock fast-forwards through the deadline.
        wait_for_status(&pipeline, Status::Idle).await;
        assert!(error_rx.try_recv().is_err());
    }

    // ---- failure paths ---

    #[tokio::test]
    async fn recorder_start_failure_surfaces_error_and_idles() {
        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(MockRecorder::failing()),
            Box::new(MockTranscriber::ok("x")),
            Arc::new(MockInjector::ok()),
            None,
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Idle).await;

        let err = error_rx.recv().await.expect("session error");
        assert_eq!(err.title, "Recording Error");
    }

    #[tokio::test]
    async fn transcriber_start_failure_stops_recorder() {
        let recorder = MockRecorder::with_frames(frames());
        let (rec_stopped, _) = recorder.stop_observer();

        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(recorder),
            Box::new(MockTranscriber::failing_start()),
            Arc::new(MockInjector::ok()),
            None,
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Idle).await;

        let err = error_rx.recv().await.expect("session error");
        assert_eq!(err.title, "Transcription Error");
        assert!(rec_stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transcriber_stop_failure_skips_injection() {
        let injector = Arc::new(MockInjector::ok());
        let calls = injector.calls();

        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(MockRecorder::with_frames(frames())),
            Box::new(MockTranscriber::failing_stop()),
            injector,
            None,
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;
        pipeline.action_sender().send(Action::Inject).await.unwrap();
        wait_for_status(&pipeline, Status::Idle).await;

        assert!(calls.lock().unwrap().is_empty());
        let err = error_rx.recv().await.expect("session error");
        assert_eq!(err.title, "Transcription Error");
        assert!(err.message.contains("stop transcriber"));
    }

    #[tokio::test]
    async fn injection_failure_surfaces_error_and_ends_in_idle() {
        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(MockRecorder::with_frames(frames())),
            Box::new(MockTranscriber::ok("hello")),
            Arc::new(MockInjector::failing()),
            None,
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;
        pipeline.action_sender().send(Action::Inject).await.unwrap();
        wait_for_status(&pipeline, Status::Idle).await;

        let err = error_rx.recv().await.expect("session error");
        assert_eq!(err.title, "Injection Error");
    }

    #[tokio::test]
    async fn empty_transcript_is_rejected_by_the_injector() {
        // An Inject that races ahead of any audio still finalizes cleanly;
        // the empty transcript is the injector's to reject.
        let injector = Arc::new(MockInjector::ok());
        let calls = injector.calls();

        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(MockRecorder::with_frames(Vec::new())),
            Box::new(MockTranscriber::ok("")),
            injector,
            None,
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;
        pipeline.action_sender().send(Action::Inject).await.unwrap();
        wait_for_status(&pipeline, Status::Idle).await;

        assert!(calls.lock().unwrap().is_empty());
        let err = error_rx.recv().await.expect("session error");
        assert_eq!(err.title, "Injection Error");
    }

    // ---- LLM cleanup ---

    #[tokio::test]
    async fn llm_mode_injects_cleaned_transcript() {
        let injector = Arc::new(MockInjector::ok());
        let calls = injector.calls();

        let pipeline = Pipeline::with_collaborators(
            llm_config(),
            Box::new(MockRecorder::with_frames(frames())),
            Box::new(MockTranscriber::ok("um, hello world")),
            injector,
            Some(Box::new(crate::llm::MockProcessor::ok("Hello world."))),
        );

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;
        pipeline.action_sender().send(Action::Inject).await.unwrap();
        wait_for_status(&pipeline, Status::Idle).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "Hello world.");
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_raw_transcript() {
        let injector = Arc::new(MockInjector::ok());
        let calls = injector.calls();

        let pipeline = Pipeline::with_collaborators(
            llm_config(),
            Box::new(MockRecorder::with_frames(frames())),
            Box::new(MockTranscriber::ok("um, hello world")),
            injector,
            Some(Box::new(crate::llm::MockProcessor::failing())),
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;
        pipeline.action_sender().send(Action::Inject).await.unwrap();
        wait_for_status(&pipeline, Status::Idle).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "um, hello world");

        let err = error_rx.recv().await.expect("session error");
        assert_eq!(err.title, "Processing Error");
    }

    // ---- error mailbox ---

    /// Recorder double whose error stream bursts more errors than the
    /// session mailbox can hold.
    struct ErrorBurstRecorder {
        burst: usize,
    }

    #[async_trait]
    impl Recorder for ErrorBurstRecorder {
        async fn start(
            &mut self,
            cancel: CancellationToken,
        ) -> Result<(mpsc::Receiver<Vec<u8>>, mpsc::Receiver<RecordError>), RecordError> {
            let (frame_tx, frame_rx) = mpsc::channel(4);
            let (error_tx, error_rx) = mpsc::channel(32);
            let burst = self.burst;
            tokio::spawn(async move {
                for i in 0..burst {
                    let _ = error_tx
                        .send(RecordError::Stream(std::io::Error::other(format!(
                            "burst {i}"
                        ))))
                        .await;
                }
                cancel.cancelled().await;
                drop(frame_tx);
            });
            Ok((frame_rx, error_rx))
        }

        async fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn error_mailbox_overflow_drops_new_errors() {
        let pipeline = Pipeline::with_collaborators(
            config(),
            Box::new(ErrorBurstRecorder { burst: 15 }),
            Box::new(MockTranscriber::ok("x")),
            Arc::new(MockInjector::ok()),
            None,
        );
        let mut error_rx = pipeline.take_error_rx().unwrap();

        let root = CancellationToken::new();
        pipeline.run(&root);
        wait_for_status(&pipeline, Status::Transcribing).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        pipeline.stop().await;

        let mut received = 0;
        while error_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, ERROR_MAILBOX_SIZE);
    }
}
