//! Configuration module for hyprvoice.
//!
//! Provides `Config` (top-level settings with validation and legacy
//! migration), `ConfigStore` (atomic snapshots + file-watch hot reload), and
//! `AppPaths` for XDG directory resolution.

pub mod paths;
pub mod settings;
pub mod store;

pub use paths::AppPaths;
pub use settings::{
    Config, ConfigError, InjectionBackend, InjectionConfig, InterventionLevel, LlmConfig,
    NotificationType, NotificationsConfig, ProcessingConfig, ProcessingMode, RecordingConfig,
    TranscriptionConfig,
};
pub use store::ConfigStore;
