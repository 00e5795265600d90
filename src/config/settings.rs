//! Configuration structs, defaults, validation and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//!
//! A missing config file is created with a fully commented default document
//! on first load, so `Config::load` never needs to special-case first runs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors surfaced while loading or validating configuration.
///
/// On reload, any of these keeps the previous snapshot in place.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML (or contains unknown enum values).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field failed semantic validation.
    #[error("{0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

// ---------------------------------------------------------------------------
// ProcessingMode
// ---------------------------------------------------------------------------

/// Post-transcription processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Direct transcription output without any post-processing.
    #[default]
    Raw,
    /// Pass the transcript through an LLM to clean up the text.
    Llm,
}

impl ProcessingMode {
    /// The wire name used by the command protocol (`m` command).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Raw => "raw",
            ProcessingMode::Llm => "llm",
        }
    }

    /// Parse a wire name; returns `None` for anything but `raw` / `llm`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(ProcessingMode::Raw),
            "llm" => Some(ProcessingMode::Llm),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// InterventionLevel
// ---------------------------------------------------------------------------

/// How aggressively the LLM rewrites the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterventionLevel {
    /// Fix typos, punctuation and capitalization only.
    Minimal,
    /// Remove filler words and fix punctuation while preserving voice.
    #[default]
    Moderate,
    /// Restructure for clarity and flow while preserving meaning.
    Thorough,
    /// Use the system prompt from `llm.custom_prompt`.
    Custom,
}

// ---------------------------------------------------------------------------
// NotificationType
// ---------------------------------------------------------------------------

/// Which notifier variant renders user-visible events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    /// Delegate to the desktop notification binary (`notify-send`).
    #[default]
    Desktop,
    /// Write to the process log.
    Log,
    /// Drop all events.
    None,
}

// ---------------------------------------------------------------------------
// InjectionBackend
// ---------------------------------------------------------------------------

/// A text injection method, tried in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionBackend {
    /// `ydotool type` — requires the ydotoold daemon; best for Chromium apps.
    Ydotool,
    /// `wtype` — native Wayland typing.
    Wtype,
    /// `wl-copy` + optional focus/paste — most reliable fallback.
    Clipboard,
}

impl InjectionBackend {
    pub fn name(&self) -> &'static str {
        match self {
            InjectionBackend::Ydotool => "ydotool",
            InjectionBackend::Wtype => "wtype",
            InjectionBackend::Clipboard => "clipboard",
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingConfig
// ---------------------------------------------------------------------------

/// Settings for the PipeWire audio capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Audio sample rate in Hz (16 000 recommended for speech).
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample format ("s16" = 16-bit signed integers).
    pub format: String,
    /// Capture read-chunk size in bytes.
    pub buffer_size: usize,
    /// PipeWire device target (empty = default microphone).
    pub device: String,
    /// Audio frame mailbox capacity (frames buffered between tasks).
    pub channel_buffer_size: usize,
    /// Maximum recording duration in seconds; the session is cancelled when
    /// it elapses.
    pub timeout_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            format: "s16".into(),
            buffer_size: 8192,
            device: String::new(),
            channel_buffer_size: 30,
            timeout_secs: 300,
        }
    }
}

impl RecordingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// TranscriptionConfig
// ---------------------------------------------------------------------------

/// Settings for the cloud speech-to-text provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Transcription service: "openai", "groq-transcription" or
    /// "groq-translation".
    pub provider: String,
    /// API key; empty means fall back to the provider's environment variable.
    pub api_key: String,
    /// ISO-639-1 language code, or empty for auto-detect.
    pub language: String,
    /// Model identifier sent to the provider.
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            api_key: String::new(),
            language: String::new(),
            model: "whisper-1".into(),
        }
    }
}

impl TranscriptionConfig {
    /// Environment variable consulted when `api_key` is empty.
    pub fn api_key_env(&self) -> &'static str {
        match self.provider.as_str() {
            "groq-transcription" | "groq-translation" => "GROQ_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }

    /// The configured key, or the provider-specific environment variable.
    pub fn effective_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var(self.api_key_env()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// InjectionConfig
// ---------------------------------------------------------------------------

/// Settings for the text injection backend chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// Ordered fallback chain; the first backend that succeeds wins.
    pub backends: Vec<InjectionBackend>,
    /// Timeout for ydotool commands, in seconds.
    pub ydotool_timeout_secs: u64,
    /// Timeout for wtype commands, in seconds.
    pub wtype_timeout_secs: u64,
    /// Timeout for clipboard operations, in seconds.
    pub clipboard_timeout_secs: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                InjectionBackend::Ydotool,
                InjectionBackend::Wtype,
                InjectionBackend::Clipboard,
            ],
            ydotool_timeout_secs: 5,
            wtype_timeout_secs: 5,
            clipboard_timeout_secs: 3,
        }
    }
}

impl InjectionConfig {
    /// Per-backend timeout from configuration.
    pub fn timeout_for(&self, backend: InjectionBackend) -> Duration {
        let secs = match backend {
            InjectionBackend::Ydotool => self.ydotool_timeout_secs,
            InjectionBackend::Wtype => self.wtype_timeout_secs,
            InjectionBackend::Clipboard => self.clipboard_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

// ---------------------------------------------------------------------------
// NotificationsConfig
// ---------------------------------------------------------------------------

/// Desktop notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Master switch; `false` forces the null notifier.
    pub enabled: bool,
    /// Which notifier variant to use when enabled.
    #[serde(rename = "type")]
    pub kind: NotificationType,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: NotificationType::Desktop,
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingConfig
// ---------------------------------------------------------------------------

/// Post-transcription processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// "raw" (default) or "llm".
    pub mode: ProcessingMode,
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the LLM cleanup step (used when `processing.mode = "llm"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider (currently only "openai").
    pub provider: String,
    /// API key; empty means fall back to `OPENAI_API_KEY`.
    pub api_key: String,
    /// Model used for text cleanup.
    pub model: String,
    /// How aggressively the transcript is rewritten.
    pub level: InterventionLevel,
    /// Custom system prompt, used when `level = "custom"`.
    pub custom_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            level: InterventionLevel::default(),
            custom_prompt: String::new(),
        }
    }
}

impl LlmConfig {
    /// The configured key, or `OPENAI_API_KEY` from the environment.
    pub fn effective_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var("OPENAI_API_KEY").unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Config  (top-level)
// ---------------------------------------------------------------------------

/// Top-level daemon configuration, serialised as `config.toml`.
///
/// A `Config` is treated as an immutable snapshot once handed to a session:
/// reloads replace the whole value atomically, never mutate it in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recording: RecordingConfig,
    pub transcription: TranscriptionConfig,
    pub injection: InjectionConfig,
    pub notifications: NotificationsConfig,
    pub processing: ProcessingConfig,
    pub llm: LlmConfig,
}

/// Shape of the legacy `[injection] mode = "…"` key, consulted only when the
/// modern `backends` array is absent.
#[derive(Debug, Default, Deserialize)]
struct LegacyConfig {
    #[serde(default)]
    injection: LegacyInjection,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyInjection {
    #[serde(default)]
    mode: String,
}

impl Config {
    /// Load configuration from the standard `config.toml` location, creating
    /// it with documented defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        let paths = AppPaths::new();
        if !paths.config_file.exists() {
            log::info!(
                "config: no config file at {}, creating with defaults",
                paths.config_file.display()
            );
            Self::write_default(&paths.config_file)?;
        }
        Self::load_from(&paths.config_file)
    }

    /// Load and validate from an explicit path (useful for tests and the
    /// reload watcher). The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Legacy migration: an old mode-based injection section has no
        // `backends` array.
        if config.injection.backends.is_empty() {
            let legacy: LegacyConfig = toml::from_str(&content).unwrap_or_default();
            config.migrate_injection_mode(&legacy.injection.mode);
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert the legacy `injection.mode` value to a backend array.
    fn migrate_injection_mode(&mut self, mode: &str) {
        self.injection.backends = match mode {
            "clipboard" => vec![InjectionBackend::Clipboard],
            "type" => vec![InjectionBackend::Wtype],
            "fallback" => vec![InjectionBackend::Wtype, InjectionBackend::Clipboard],
            other => {
                if !other.is_empty() {
                    log::warn!("config: unknown injection.mode={other:?}, using default backends");
                }
                InjectionConfig::default().backends
            }
        };
        if !mode.is_empty() {
            log::warn!(
                "config: legacy injection.mode detected — please switch to injection.backends"
            );
        }
    }

    /// Semantic validation; every rejected field keeps the previous snapshot
    /// alive on reload.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Recording
        if self.recording.sample_rate == 0 {
            return Err(invalid("invalid recording.sample_rate: 0"));
        }
        if self.recording.channels == 0 {
            return Err(invalid("invalid recording.channels: 0"));
        }
        if self.recording.buffer_size == 0 {
            return Err(invalid("invalid recording.buffer_size: 0"));
        }
        if self.recording.channel_buffer_size == 0 {
            return Err(invalid("invalid recording.channel_buffer_size: 0"));
        }
        if self.recording.format.is_empty() {
            return Err(invalid("invalid recording.format: empty"));
        }
        if self.recording.timeout_secs == 0 {
            return Err(invalid("invalid recording.timeout_secs: 0"));
        }

        // Transcription
        let t = &self.transcription;
        if t.provider.is_empty() {
            return Err(invalid("invalid transcription.provider: empty"));
        }
        match t.provider.as_str() {
            "openai" => {}
            "groq-transcription" => {
                if !t.model.is_empty()
                    && t.model != "whisper-large-v3"
                    && t.model != "whisper-large-v3-turbo"
                {
                    return Err(invalid(format!(
                        "invalid model for groq-transcription: {} \
                         (must be whisper-large-v3 or whisper-large-v3-turbo)",
                        t.model
                    )));
                }
            }
            "groq-translation" => {
                if !t.model.is_empty() && t.model != "whisper-large-v3" {
                    return Err(invalid(format!(
                        "invalid model for groq-translation: {} \
                         (must be whisper-large-v3, turbo not supported for translation)",
                        t.model
                    )));
                }
            }
            other => {
                return Err(invalid(format!(
                    "unsupported transcription.provider: {other} \
                     (must be openai, groq-transcription, or groq-translation)"
                )));
            }
        }
        if t.effective_api_key().is_empty() {
            return Err(invalid(format!(
                "{} API key required: not found in config (transcription.api_key) \
                 or environment variable ({})",
                t.provider,
                t.api_key_env()
            )));
        }
        if !t.language.is_empty() && !is_valid_language_code(&t.language) {
            return Err(invalid(format!(
                "invalid transcription.language: {} \
                 (use empty string for auto-detect or ISO-639-1 codes like 'en', 'es', 'fr')",
                t.language
            )));
        }
        if t.model.is_empty() {
            return Err(invalid("invalid transcription.model: empty"));
        }

        // Injection
        if self.injection.backends.is_empty() {
            return Err(invalid(
                "invalid injection.backends: empty (must have at least one backend)",
            ));
        }
        if self.injection.ydotool_timeout_secs == 0 {
            return Err(invalid("invalid injection.ydotool_timeout_secs: 0"));
        }
        if self.injection.wtype_timeout_secs == 0 {
            return Err(invalid("invalid injection.wtype_timeout_secs: 0"));
        }
        if self.injection.clipboard_timeout_secs == 0 {
            return Err(invalid("invalid injection.clipboard_timeout_secs: 0"));
        }

        // LLM settings only matter when cleanup is enabled
        if self.processing.mode == ProcessingMode::Llm {
            if self.llm.provider != "openai" {
                return Err(invalid(format!(
                    "invalid llm.provider: {} (must be openai)",
                    self.llm.provider
                )));
            }
            if self.llm.model.is_empty() {
                return Err(invalid("invalid llm.model: empty"));
            }
            if self.llm.level == InterventionLevel::Custom && self.llm.custom_prompt.is_empty() {
                return Err(invalid(
                    "llm.custom_prompt is required when llm.level is 'custom'",
                ));
            }
            if self.llm.effective_api_key().is_empty() {
                return Err(invalid(
                    "LLM API key required when processing.mode is 'llm': not found in \
                     config (llm.api_key) or environment variable (OPENAI_API_KEY)",
                ));
            }
        }

        Ok(())
    }

    /// Return a copy with the runtime mode override applied, for new
    /// sessions only.
    pub fn with_mode(&self, mode: ProcessingMode) -> Self {
        let mut copy = self.clone();
        copy.processing.mode = mode;
        copy
    }

    /// Serialise this config over the commented default document and write it
    /// to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_document())?;
        Ok(())
    }

    /// Write the documented default configuration to `path`.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        Config::default().save_to(path)
    }

    /// Render the full commented config document with this config's values.
    fn to_document(&self) -> String {
        let backends = self
            .injection
            .backends
            .iter()
            .map(|b| format!("{:?}", b.name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"# Hyprvoice Configuration
# This file is automatically generated with defaults.
# Edit values as needed - changes are applied immediately without daemon restart.

# Audio Recording Configuration
[recording]
sample_rate = {sample_rate}          # Audio sample rate in Hz (16000 recommended for speech)
channels = {channels}                # Number of audio channels (1 = mono, 2 = stereo)
format = "{format}"                  # Audio format (s16 = 16-bit signed integers)
buffer_size = {buffer_size}          # Internal buffer size in bytes (larger = less CPU, more latency)
device = "{device}"                  # PipeWire audio device (empty = use default microphone)
channel_buffer_size = {channel_buffer_size}  # Audio frame buffer size (frames to buffer)
timeout_secs = {timeout_secs}        # Maximum recording duration in seconds

# Speech Transcription Configuration
[transcription]
provider = "{provider}"              # "openai", "groq-transcription", or "groq-translation"
api_key = "{t_api_key}"              # API key (or set OPENAI_API_KEY/GROQ_API_KEY environment variable)
language = "{language}"              # Language code (empty for auto-detect, "en", "it", "es", ...)
model = "{model}"                    # OpenAI="whisper-1", Groq="whisper-large-v3[-turbo]"

# Text Injection Configuration
[injection]
backends = [{backends}]  # Ordered fallback chain (tries each until one succeeds)
ydotool_timeout_secs = {ydotool_timeout}    # Timeout for ydotool commands
wtype_timeout_secs = {wtype_timeout}        # Timeout for wtype commands
clipboard_timeout_secs = {clipboard_timeout}  # Timeout for clipboard operations

# Desktop Notification Configuration
[notifications]
enabled = {notif_enabled}            # Enable desktop notifications
type = "{notif_type}"                # Notification type ("desktop", "log", "none")

# Post-Transcription Processing Configuration
[processing]
mode = "{mode}"                      # "raw" (direct transcription) or "llm" (AI cleanup)

# LLM Configuration (used when processing.mode = "llm")
[llm]
provider = "{llm_provider}"          # LLM provider (currently only "openai" supported)
api_key = "{llm_api_key}"            # API key (or use OPENAI_API_KEY environment variable)
model = "{llm_model}"                # Model to use for text cleanup
level = "{llm_level}"                # "minimal", "moderate", "thorough", or "custom"
custom_prompt = "{custom_prompt}"    # Custom system prompt (used when level = "custom")

# Backend explanations:
# - "ydotool": Uses ydotool (requires ydotoold daemon running). Most compatible with Chromium/Electron apps.
# - "wtype": Uses wtype for Wayland. May have issues with some Chromium-based apps.
# - "clipboard": Copies text to clipboard only (most reliable, but requires manual paste).
#
# The backends are tried in order. First successful one wins.
#
# LLM level explanations:
# - "minimal":  Light touch - only fix typos, punctuation, and capitalization
# - "moderate": Balanced - remove filler words (um, uh) and fix punctuation while preserving voice
# - "thorough": Full rewrite - restructure for clarity and flow while preserving meaning
# - "custom":   Use your own system prompt defined in custom_prompt
"#,
            sample_rate = self.recording.sample_rate,
            channels = self.recording.channels,
            format = self.recording.format,
            buffer_size = self.recording.buffer_size,
            device = self.recording.device,
            channel_buffer_size = self.recording.channel_buffer_size,
            timeout_secs = self.recording.timeout_secs,
            provider = self.transcription.provider,
            t_api_key = escape_toml(&self.transcription.api_key),
            language = self.transcription.language,
            model = self.transcription.model,
            backends = backends,
            ydotool_timeout = self.injection.ydotool_timeout_secs,
            wtype_timeout = self.injection.wtype_timeout_secs,
            clipboard_timeout = self.injection.clipboard_timeout_secs,
            notif_enabled = self.notifications.enabled,
            notif_type = match self.notifications.kind {
                NotificationType::Desktop => "desktop",
                NotificationType::Log => "log",
                NotificationType::None => "none",
            },
            mode = self.processing.mode,
            llm_provider = self.llm.provider,
            llm_api_key = escape_toml(&self.llm.api_key),
            llm_model = self.llm.model,
            llm_level = match self.llm.level {
                InterventionLevel::Minimal => "minimal",
                InterventionLevel::Moderate => "moderate",
                InterventionLevel::Thorough => "thorough",
                InterventionLevel::Custom => "custom",
            },
            custom_prompt = escape_toml(&self.llm.custom_prompt),
        )
    }
}

/// Escape a value for inclusion in a double-quoted TOML string.
fn escape_toml(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// ISO-639-1 codes accepted by the transcription providers.
const LANGUAGE_CODES: &[&str] = &[
    "en", "es", "fr", "de", "it", "pt", "ru", "ja", "ko", "zh", "ar", "hi", "nl", "sv", "da",
    "no", "fi", "pl", "tr", "he", "th", "vi", "id", "ms", "uk", "cs", "hu", "ro", "bg", "hr",
    "sk", "sl", "et", "lv", "lt", "mt", "cy", "ga", "eu", "ca", "gl", "is", "mk", "sq", "az",
    "be", "ka", "hy", "kk", "ky", "tg", "uz", "mn", "ne", "si", "km", "lo", "my", "fa", "ps",
    "ur", "bn", "ta", "te", "ml", "kn", "gu", "pa", "or", "as", "mr", "sa", "sw", "yo", "ig",
    "ha", "zu", "xh", "af", "am", "mg", "so", "sn", "rw",
];

fn is_valid_language_code(code: &str) -> bool {
    LANGUAGE_CODES.contains(&code)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid_config() -> Config {
        let mut cfg = Config::default();
        cfg.transcription.api_key = "test-key".into();
        cfg
    }

    // ---- persistence ---

    #[test]
    fn round_trip_default_document() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");

        let original = valid_config();
        original.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");

        assert_eq!(loaded.recording.sample_rate, original.recording.sample_rate);
        assert_eq!(loaded.recording.timeout_secs, original.recording.timeout_secs);
        assert_eq!(loaded.transcription.provider, original.transcription.provider);
        assert_eq!(loaded.transcription.api_key, original.transcription.api_key);
        assert_eq!(loaded.transcription.model, original.transcription.model);
        assert_eq!(loaded.injection.backends, original.injection.backends);
        assert_eq!(loaded.notifications.kind, original.notifications.kind);
        assert_eq!(loaded.processing.mode, original.processing.mode);
        assert_eq!(loaded.llm.level, original.llm.level);
    }

    #[test]
    fn default_values_are_documented_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.recording.sample_rate, 16_000);
        assert_eq!(cfg.recording.channels, 1);
        assert_eq!(cfg.recording.format, "s16");
        assert_eq!(cfg.recording.timeout_secs, 300);
        assert_eq!(cfg.transcription.provider, "openai");
        assert_eq!(cfg.transcription.model, "whisper-1");
        assert_eq!(
            cfg.injection.backends,
            vec![
                InjectionBackend::Ydotool,
                InjectionBackend::Wtype,
                InjectionBackend::Clipboard
            ]
        );
        assert_eq!(cfg.injection.ydotool_timeout_secs, 5);
        assert_eq!(cfg.injection.clipboard_timeout_secs, 3);
        assert!(cfg.notifications.enabled);
        assert_eq!(cfg.processing.mode, ProcessingMode::Raw);
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.llm.level, InterventionLevel::Moderate);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[transcription]\napi_key = \"k\"\n",
        )
        .unwrap();

        let cfg = Config::load_from(&path).expect("load");
        assert_eq!(cfg.recording.sample_rate, 16_000);
        assert_eq!(cfg.transcription.api_key, "k");
        // A missing injection section still yields the full default chain.
        assert_eq!(cfg.injection.backends.len(), 3);
    }

    // ---- validation ---

    #[test]
    fn rejects_zero_sample_rate() {
        let mut cfg = valid_config();
        cfg.recording.sample_rate = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = valid_config();
        cfg.recording.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_provider() {
        let mut cfg = valid_config();
        cfg.transcription.provider.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let mut cfg = valid_config();
        cfg.transcription.provider = "azure".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported transcription.provider"));
    }

    #[test]
    fn rejects_empty_model() {
        let mut cfg = valid_config();
        cfg.transcription.model.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_groq_model() {
        let mut cfg = valid_config();
        cfg.transcription.provider = "groq-transcription".into();
        cfg.transcription.model = "whisper-1".into();
        assert!(cfg.validate().is_err());

        cfg.transcription.model = "whisper-large-v3-turbo".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_turbo_for_translation() {
        let mut cfg = valid_config();
        cfg.transcription.provider = "groq-translation".into();
        cfg.transcription.model = "whisper-large-v3-turbo".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_language_code() {
        let mut cfg = valid_config();
        cfg.transcription.language = "english".into();
        assert!(cfg.validate().is_err());

        cfg.transcription.language = "en".into();
        assert!(cfg.validate().is_ok());

        cfg.transcription.language.clear(); // auto-detect
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_empty_backends() {
        let mut cfg = valid_config();
        cfg.injection.backends.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_backend_timeout() {
        let mut cfg = valid_config();
        cfg.injection.wtype_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_missing_api_key() {
        // groq env var is not set by any test in this crate
        std::env::remove_var("GROQ_API_KEY");
        let mut cfg = Config::default();
        cfg.transcription.provider = "groq-transcription".into();
        cfg.transcription.model = "whisper-large-v3".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn rejects_custom_level_without_prompt() {
        let mut cfg = valid_config();
        cfg.processing.mode = ProcessingMode::Llm;
        cfg.llm.api_key = "k".into();
        cfg.llm.level = InterventionLevel::Custom;
        assert!(cfg.validate().is_err());

        cfg.llm.custom_prompt = "You fix text.".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn llm_mode_with_config_key_validates() {
        let mut cfg = valid_config();
        cfg.processing.mode = ProcessingMode::Llm;
        cfg.llm.api_key = "k".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn api_key_env_follows_provider() {
        let mut cfg = valid_config();
        assert_eq!(cfg.transcription.api_key_env(), "OPENAI_API_KEY");
        cfg.transcription.provider = "groq-transcription".into();
        assert_eq!(cfg.transcription.api_key_env(), "GROQ_API_KEY");
        cfg.transcription.provider = "groq-translation".into();
        assert_eq!(cfg.transcription.api_key_env(), "GROQ_API_KEY");
    }

    #[test]
    fn unknown_backend_name_fails_parse() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[injection]\nbackends = [\"xdotool\"]\n",
        )
        .unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn unknown_notification_type_fails_parse() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[notifications]\ntype = \"popup\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    // ---- legacy migration ---

    fn load_with_legacy_mode(mode: &str) -> Config {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "[transcription]\napi_key = \"k\"\n\n[injection]\nmode = \"{mode}\"\n"
            ),
        )
        .unwrap();
        Config::load_from(&path).expect("load")
    }

    #[test]
    fn migrates_legacy_clipboard_mode() {
        let cfg = load_with_legacy_mode("clipboard");
        assert_eq!(cfg.injection.backends, vec![InjectionBackend::Clipboard]);
    }

    #[test]
    fn migrates_legacy_type_mode() {
        let cfg = load_with_legacy_mode("type");
        assert_eq!(cfg.injection.backends, vec![InjectionBackend::Wtype]);
    }

    #[test]
    fn migrates_legacy_fallback_mode() {
        let cfg = load_with_legacy_mode("fallback");
        assert_eq!(
            cfg.injection.backends,
            vec![InjectionBackend::Wtype, InjectionBackend::Clipboard]
        );
    }

    #[test]
    fn unknown_legacy_mode_gets_default_chain() {
        let cfg = load_with_legacy_mode("telepathy");
        assert_eq!(cfg.injection.backends.len(), 3);
    }

    // ---- mode override ---

    #[test]
    fn with_mode_does_not_mutate_original() {
        let cfg = valid_config();
        let overridden = cfg.with_mode(ProcessingMode::Llm);
        assert_eq!(cfg.processing.mode, ProcessingMode::Raw);
        assert_eq!(overridden.processing.mode, ProcessingMode::Llm);
    }

    #[test]
    fn processing_mode_parse_round_trip() {
        assert_eq!(ProcessingMode::parse("raw"), Some(ProcessingMode::Raw));
        assert_eq!(ProcessingMode::parse("llm"), Some(ProcessingMode::Llm));
        assert_eq!(ProcessingMode::parse("fast"), None);
        assert_eq!(ProcessingMode::Llm.to_string(), "llm");
    }
}
