//! Interactive configuration wizard (`hyprvoice configure`).
//!
//! Walks through provider, model, API key, injection and processing
//! settings, validates the result, and writes `config.toml`. Pressing Enter
//! keeps the current value everywhere.

use std::io::{BufRead, Write};

use crate::config::{
    AppPaths, Config, InjectionBackend, InterventionLevel, ProcessingMode,
};

/// Run the wizard against stdin/stdout.
pub fn run() -> anyhow::Result<()> {
    println!("Hyprvoice Configuration Wizard");
    println!("==============================");
    println!();

    let mut cfg = Config::load().unwrap_or_else(|e| {
        log::warn!("wizard: could not load existing config ({e}), starting from defaults");
        Config::default()
    });

    let stdin = std::io::stdin();
    let mut input = stdin.lock();

    configure_transcription(&mut input, &mut cfg)?;
    configure_injection(&mut input, &mut cfg)?;
    configure_notifications(&mut input, &mut cfg)?;
    configure_recording(&mut input, &mut cfg)?;
    configure_processing(&mut input, &mut cfg)?;

    println!();
    if let Err(e) = cfg.validate() {
        println!("Configuration validation failed: {e}");
        println!("Please check your inputs and try again.");
        anyhow::bail!("invalid configuration");
    }

    let paths = AppPaths::new();
    cfg.save_to(&paths.config_file)?;
    println!("Configuration saved to {}", paths.config_file.display());
    println!();
    println!("Next steps:");
    if cfg.injection.backends.contains(&InjectionBackend::Ydotool) {
        println!("- ensure ydotoold is running");
    }
    println!("- start the daemon: systemctl --user restart hyprvoice.service");
    println!("- test voice input: hyprvoice toggle");
    Ok(())
}

fn prompt(input: &mut impl BufRead, message: &str) -> anyhow::Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn configure_transcription(input: &mut impl BufRead, cfg: &mut Config) -> anyhow::Result<()> {
    println!("Transcription");
    println!("-------------");
    println!("  1. openai             - OpenAI Whisper API");
    println!("  2. groq-transcription - Groq Whisper API (fast transcription)");
    println!("  3. groq-translation   - Groq Whisper API (translate to English)");

    loop {
        let answer = prompt(
            input,
            &format!("Provider [1-3] (current: {}): ", cfg.transcription.provider),
        )?;
        match answer.as_str() {
            "" => break,
            "1" | "openai" => {
                cfg.transcription.provider = "openai".into();
                if cfg.transcription.model.is_empty() {
                    cfg.transcription.model = "whisper-1".into();
                }
                break;
            }
            "2" | "groq-transcription" => {
                cfg.transcription.provider = "groq-transcription".into();
                cfg.transcription.model = "whisper-large-v3-turbo".into();
                break;
            }
            "3" | "groq-translation" => {
                cfg.transcription.provider = "groq-translation".into();
                cfg.transcription.model = "whisper-large-v3".into();
                break;
            }
            _ => println!("Invalid provider, enter 1, 2, 3 or a provider name."),
        }
    }

    let answer = prompt(
        input,
        &format!("Model (current: {}): ", cfg.transcription.model),
    )?;
    if !answer.is_empty() {
        cfg.transcription.model = answer;
    }

    let env_var = cfg.transcription.api_key_env();
    let answer = prompt(
        input,
        &format!(
            "API key (current: {}, empty keeps current / uses {env_var}): ",
            mask_api_key(&cfg.transcription.api_key)
        ),
    )?;
    if !answer.is_empty() {
        cfg.transcription.api_key = answer;
    }

    let answer = prompt(
        input,
        &format!(
            "Language code (empty for auto-detect, current: {}): ",
            cfg.transcription.language
        ),
    )?;
    cfg.transcription.language = answer;

    println!();
    Ok(())
}

fn configure_injection(input: &mut impl BufRead, cfg: &mut Config) -> anyhow::Result<()> {
    println!("Text Injection");
    println!("--------------");
    println!("Backends are tried in order until one succeeds:");
    println!("  ydotool   - best for Chromium/Electron apps (needs ydotoold)");
    println!("  wtype     - native Wayland typing");
    println!("  clipboard - copy only (most reliable, manual paste)");

    loop {
        let current = cfg
            .injection
            .backends
            .iter()
            .map(|b| b.name())
            .collect::<Vec<_>>()
            .join(",");
        let answer = prompt(
            input,
            &format!("Backends, comma-separated (current: {current}): "),
        )?;
        if answer.is_empty() {
            break;
        }

        let mut backends = Vec::new();
        let mut bad = Vec::new();
        for name in answer.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name {
                "ydotool" => backends.push(InjectionBackend::Ydotool),
                "wtype" => backends.push(InjectionBackend::Wtype),
                "clipboard" => backends.push(InjectionBackend::Clipboard),
                other => bad.push(other.to_string()),
            }
        }
        if !bad.is_empty() {
            println!(
                "Invalid backend(s): {}. Valid: ydotool, wtype, clipboard.",
                bad.join(", ")
            );
            continue;
        }
        if backends.is_empty() {
            println!("At least one backend is required.");
            continue;
        }
        cfg.injection.backends = backends;
        break;
    }

    if cfg.injection.backends.contains(&InjectionBackend::Ydotool) {
        println!("Note: ydotool requires the ydotoold daemon to be running.");
    }
    println!();
    Ok(())
}

fn configure_notifications(input: &mut impl BufRead, cfg: &mut Config) -> anyhow::Result<()> {
    println!("Notifications");
    println!("-------------");
    loop {
        let answer = prompt(
            input,
            &format!(
                "Enable notifications [y/n] (current: {}): ",
                cfg.notifications.enabled
            ),
        )?;
        match answer.to_lowercase().as_str() {
            "" => break,
            "y" | "yes" => {
                cfg.notifications.enabled = true;
                break;
            }
            "n" | "no" => {
                cfg.notifications.enabled = false;
                break;
            }
            _ => println!("Please enter y or n."),
        }
    }
    println!();
    Ok(())
}

fn configure_recording(input: &mut impl BufRead, cfg: &mut Config) -> anyhow::Result<()> {
    println!("Recording");
    println!("---------");
    loop {
        let answer = prompt(
            input,
            &format!(
                "Recording timeout in minutes (current: {}): ",
                cfg.recording.timeout_secs / 60
            ),
        )?;
        if answer.is_empty() {
            break;
        }
        match answer.parse::<u64>() {
            Ok(minutes) if minutes > 0 => {
                cfg.recording.timeout_secs = minutes * 60;
                break;
            }
            _ => println!("Please enter a positive number."),
        }
    }
    println!();
    Ok(())
}

fn configure_processing(input: &mut impl BufRead, cfg: &mut Config) -> anyhow::Result<()> {
    println!("Post-Processing");
    println!("---------------");
    println!("  1. raw - direct transcription (no cleanup)");
    println!("  2. llm - AI-powered cleanup (removes filler words, fixes punctuation)");
    loop {
        let answer = prompt(
            input,
            &format!("Mode [1-2] (current: {}): ", cfg.processing.mode),
        )?;
        match answer.as_str() {
            "" => break,
            "1" | "raw" => {
                cfg.processing.mode = ProcessingMode::Raw;
                break;
            }
            "2" | "llm" => {
                cfg.processing.mode = ProcessingMode::Llm;
                break;
            }
            _ => println!("Please enter 1, 2, raw, or llm."),
        }
    }

    if cfg.processing.mode == ProcessingMode::Llm {
        let answer = prompt(
            input,
            &format!(
                "OpenAI API key (current: {}, empty keeps current / uses OPENAI_API_KEY): ",
                mask_api_key(&cfg.llm.api_key)
            ),
        )?;
        if !answer.is_empty() {
            cfg.llm.api_key = answer;
        }

        let answer = prompt(input, &format!("Model (current: {}): ", cfg.llm.model))?;
        if !answer.is_empty() {
            cfg.llm.model = answer;
        }

        println!("  1. minimal  - fix typos and punctuation only");
        println!("  2. moderate - remove filler words, fix punctuation");
        println!("  3. thorough - restructure for clarity");
        println!("  4. custom   - use your own system prompt");
        loop {
            let answer = prompt(input, "Level [1-4]: ")?;
            match answer.as_str() {
                "" => break,
                "1" | "minimal" => {
                    cfg.llm.level = InterventionLevel::Minimal;
                    break;
                }
                "2" | "moderate" => {
                    cfg.llm.level = InterventionLevel::Moderate;
                    break;
                }
                "3" | "thorough" => {
                    cfg.llm.level = InterventionLevel::Thorough;
                    break;
                }
                "4" | "custom" => {
                    cfg.llm.level = InterventionLevel::Custom;
                    break;
                }
                _ => println!("Please enter 1-4 or a level name."),
            }
        }

        if cfg.llm.level == InterventionLevel::Custom {
            let answer = prompt(input, "Custom system prompt (single line): ")?;
            if !answer.is_empty() {
                cfg.llm.custom_prompt = answer;
            }
        }
    }
    Ok(())
}

fn mask_api_key(key: &str) -> String {
    if key.is_empty() {
        return "<not set>".into();
    }
    if key.len() <= 8 {
        return "****".into();
    }
    format!("{}****{}", &key[..4], &key[key.len() - 4..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_are_masked() {
        assert_eq!(mask_api_key(""), "<not set>");
        assert_eq!(mask_api_key("short"), "****");
        assert_eq!(mask_api_key("sk-abcdefghijklmnop"), "sk-a****mnop");
    }

    #[test]
    fn transcription_section_accepts_numeric_choice() {
        let mut cfg = Config::default();
        let mut input = std::io::Cursor::new("2\n\n\n\n");
        configure_transcription(&mut input, &mut cfg).unwrap();
        assert_eq!(cfg.transcription.provider, "groq-transcription");
        assert_eq!(cfg.transcription.model, "whisper-large-v3-turbo");
    }

    #[test]
    fn injection_section_parses_backend_list() {
        let mut cfg = Config::default();
        let mut input = std::io::Cursor::new("wtype, clipboard\n");
        configure_injection(&mut input, &mut cfg).unwrap();
        assert_eq!(
            cfg.injection.backends,
            vec![InjectionBackend::Wtype, InjectionBackend::Clipboard]
        );
    }

    #[test]
    fn empty_answers_keep_current_values() {
        let mut cfg = Config::default();
        let before = cfg.clone();
        let mut input = std::io::Cursor::new("\n\n\n\n\n\n\n\n\n\n");
        configure_transcription(&mut input, &mut cfg).unwrap();
        configure_injection(&mut input, &mut cfg).unwrap();
        configure_notifications(&mut input, &mut cfg).unwrap();
        configure_recording(&mut input, &mut cfg).unwrap();
        configure_processing(&mut input, &mut cfg).unwrap();

        assert_eq!(cfg.transcription.provider, before.transcription.provider);
        assert_eq!(cfg.injection.backends, before.injection.backends);
        assert_eq!(cfg.notifications.enabled, before.notifications.enabled);
        assert_eq!(cfg.recording.timeout_secs, before.recording.timeout_secs);
        assert_eq!(cfg.processing.mode, before.processing.mode);
    }
}
