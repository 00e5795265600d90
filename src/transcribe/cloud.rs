//! Cloud Whisper transcriber.
//!
//! Accumulates raw PCM frames for the lifetime of a session, then on
//! finalisation wraps them in a WAV container and posts one multipart
//! request to the configured provider:
//!
//! | provider            | endpoint                                            |
//! |---------------------|-----------------------------------------------------|
//! | openai              | api.openai.com `/v1/audio/transcriptions`           |
//! | groq-transcription  | api.groq.com `/openai/v1/audio/transcriptions`      |
//! | groq-translation    | api.groq.com `/openai/v1/audio/translations`        |
//!
//! The providers answer `{"text": "..."}`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

use super::{TranscribeError, Transcriber};

/// Client-side bound on the finalisation request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Accumulates session audio and transcribes it in one shot on `stop`.
pub struct CloudTranscriber {
    provider: String,
    api_key: String,
    model: String,
    language: String,
    sample_rate: u32,
    channels: u16,
    client: reqwest::Client,
    audio: Arc<Mutex<Vec<u8>>>,
    drain: Option<JoinHandle<()>>,
    result: Option<Result<String, String>>,
}

impl CloudTranscriber {
    /// Build a transcriber from a configuration snapshot.
    pub fn from_config(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            provider: config.transcription.provider.clone(),
            api_key: config.transcription.effective_api_key(),
            model: config.transcription.model.clone(),
            language: config.transcription.language.clone(),
            sample_rate: config.recording.sample_rate,
            channels: config.recording.channels,
            client,
            audio: Arc::new(Mutex::new(Vec::new())),
            drain: None,
            result: None,
        }
    }

    fn endpoint(&self) -> &'static str {
        match self.provider.as_str() {
            "groq-transcription" => "https://api.groq.com/openai/v1/audio/transcriptions",
            "groq-translation" => "https://api.groq.com/openai/v1/audio/translations",
            _ => "https://api.openai.com/v1/audio/transcriptions",
        }
    }

    /// Send the accumulated audio to the provider and return its transcript.
    async fn transcribe(&self, pcm: Vec<u8>) -> Result<String, TranscribeError> {
        let wav = wav_from_pcm(&pcm, self.sample_rate, self.channels);
        log::debug!(
            "transcribe: sending {} bytes of audio to {}",
            wav.len(),
            self.provider
        );

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::Request(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());
        if !self.language.is_empty() {
            form = form.text("language", self.language.clone());
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranscribeError::Parse(e.to_string()))?;

        json["text"]
            .as_str()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| TranscribeError::Parse("missing \"text\" field".into()))
    }
}

#[async_trait]
impl Transcriber for CloudTranscriber {
    async fn start(
        &mut self,
        cancel: CancellationToken,
        mut frames: mpsc::Receiver<Vec<u8>>,
    ) -> Result<mpsc::Receiver<TranscribeError>, TranscribeError> {
        if self.drain.is_some() {
            return Err(TranscribeError::AlreadyStarted);
        }

        let (_error_tx, error_rx) = mpsc::channel(8);
        let audio = Arc::clone(&self.audio);
        self.drain = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = frames.recv() => match frame {
                        Some(frame) => audio.lock().unwrap().extend_from_slice(&frame),
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                }
            }
        }));
        Ok(error_rx)
    }

    async fn stop(&mut self, cancel: CancellationToken) -> Result<(), TranscribeError> {
        let Some(drain) = self.drain.take() else {
            // Never started or already finalized; both are fine.
            return Ok(());
        };
        let _ = drain.await;

        let pcm = std::mem::take(&mut *self.audio.lock().unwrap());
        if pcm.is_empty() {
            log::debug!("transcribe: no audio captured, finalizing to empty transcript");
            self.result = Some(Ok(String::new()));
            return Ok(());
        }

        let outcome = tokio::select! {
            outcome = self.transcribe(pcm) => outcome,
            _ = cancel.cancelled() => Err(TranscribeError::Timeout),
        };

        match outcome {
            Ok(text) => {
                self.result = Some(Ok(text));
                Ok(())
            }
            Err(e) => {
                self.result = Some(Err(e.to_string()));
                Err(e)
            }
        }
    }

    async fn final_text(&mut self) -> Result<String, TranscribeError> {
        match self.result.take() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(TranscribeError::Request(message)),
            None => Err(TranscribeError::NotFinalized),
        }
    }
}

/// Wrap raw little-endian PCM in a minimal 16-bit WAV container.
fn wav_from_pcm(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    const BITS_PER_SAMPLE: u16 = 16;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(BITS_PER_SAMPLE) / 8;
    let block_align = channels * BITS_PER_SAMPLE / 8;
    let data_len = pcm.len() as u32;

    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config() -> Config {
        let mut config = Config::default();
        config.transcription.api_key = "test-key".into();
        config
    }

    #[test]
    fn endpoint_follows_provider() {
        let mut cfg = config();
        let t = CloudTranscriber::from_config(&cfg);
        assert!(t.endpoint().contains("api.openai.com"));

        cfg.transcription.provider = "groq-transcription".into();
        let t = CloudTranscriber::from_config(&cfg);
        assert!(t.endpoint().contains("api.groq.com"));
        assert!(t.endpoint().ends_with("transcriptions"));

        cfg.transcription.provider = "groq-translation".into();
        let t = CloudTranscriber::from_config(&cfg);
        assert!(t.endpoint().ends_with("translations"));
    }

    #[test]
    fn wav_header_is_well_formed() {
        let pcm = vec![0u8; 3200]; // 100 ms of 16 kHz mono s16
        let wav = wav_from_pcm(&pcm, 16_000, 1);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1); // channels
        assert_eq!(
            u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]),
            16_000
        );
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(
            u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]) as usize,
            pcm.len()
        );
        assert_eq!(wav.len(), 44 + pcm.len());
    }

    #[tokio::test]
    async fn empty_session_finalizes_to_empty_transcript() {
        let cancel = CancellationToken::new();
        let mut t = CloudTranscriber::from_config(&config());

        let (frame_tx, frame_rx) = mpsc::channel(4);
        let _errors = t.start(cancel.clone(), frame_rx).await.unwrap();
        drop(frame_tx); // stream ends with no frames

        t.stop(cancel).await.unwrap();
        assert_eq!(t.final_text().await.unwrap(), "");
    }

    #[tokio::test]
    async fn final_text_before_stop_is_an_error() {
        let mut t = CloudTranscriber::from_config(&config());
        assert!(matches!(
            t.final_text().await,
            Err(TranscribeError::NotFinalized)
        ));
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let cancel = CancellationToken::new();
        let mut t = CloudTranscriber::from_config(&config());

        let (_tx1, rx1) = mpsc::channel(1);
        let (_tx2, rx2) = mpsc::channel(1);
        t.start(cancel.clone(), rx1).await.unwrap();
        assert!(matches!(
            t.start(cancel, rx2).await,
            Err(TranscribeError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn cancelled_stop_with_audio_reports_failure_not_transcript() {
        let cancel = CancellationToken::new();
        let mut t = CloudTranscriber::from_config(&config());

        let (frame_tx, frame_rx) = mpsc::channel(4);
        let _errors = t.start(cancel.clone(), frame_rx).await.unwrap();
        frame_tx.send(vec![1, 2, 3]).await.unwrap();
        frame_tx.send(vec![4]).await.unwrap();
        drop(frame_tx);

        // Let the drain task consume the buffered frames and exit on
        // end-of-stream, then cancel so finalisation aborts before any
        // network round-trip.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let result = t.stop(cancel).await;
        assert!(result.is_err());
        assert!(matches!(
            t.final_text().await,
            Err(TranscribeError::Request(_))
        ));
    }
}
