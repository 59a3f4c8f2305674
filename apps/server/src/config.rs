//! Environment-driven configuration.
//!
//! Every knob comes from the environment; an unparseable value is a
//! misconfiguration (exit code 2), a missing credential is a startup error
//! (exit code 1) raised later when the component that needs it is built.

use kisanvani_translate::Service;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("invalid TRANSLATION_SERVICES: {0}")]
    Services(#[from] kisanvani_translate::TranslateError),
}

/// Alternative recognition languages offered when auto-detect is on.
pub const AUTO_DETECT_LANGUAGES: &[&str] = &["en-IN", "bn-IN", "te-IN", "mr-IN", "ta-IN"];

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub primary_language: String,
    pub stt_model: Option<String>,
    pub language_auto_detect: bool,
    pub sample_rate: u32,
    pub translation_services: Vec<Service>,
    pub tts_voice_quality: String,
    pub pipeline_workers: usize,
    pub specialist_deadline: Duration,
    pub llm_timeout: Duration,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub speech_api_url: String,
    pub tts_api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = PathBuf::from(env_or("KISANVANI_ROOT", "."));

        let sample_rate = parse_env("AUDIO_SAMPLE_RATE", 16_000u32)?;
        let pipeline_workers = parse_env("PIPELINE_WORKERS", 4usize)?;
        let specialist_deadline = Duration::from_secs(parse_env("SPECIALIST_DEADLINE_SECS", 30u64)?);
        let llm_timeout = Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 60u64)?);

        let services = env_or(
            "TRANSLATION_SERVICES",
            "google_cloud,free_google,mymemory,libretranslate",
        );
        let translation_services = Service::parse_preference_list(&services)?;

        let language_auto_detect = match env_or("LANGUAGE_AUTO_DETECT", "true").to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::Invalid {
                    key: "LANGUAGE_AUTO_DETECT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            root,
            primary_language: env_or("PRIMARY_LANGUAGE", "hi-IN"),
            stt_model: std::env::var("SPEECH_TO_TEXT_MODEL").ok().filter(|m| !m.is_empty()),
            language_auto_detect,
            sample_rate,
            translation_services,
            tts_voice_quality: env_or("TTS_VOICE_QUALITY", "standard"),
            pipeline_workers: pipeline_workers.max(1),
            specialist_deadline,
            llm_timeout,
            llm_base_url: env_or("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
            llm_model: env_or("LLM_MODEL", "deepseek/deepseek-chat"),
            llm_api_key: std::env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.is_empty()),
            google_api_key: std::env::var("GOOGLE_API_KEY").ok().filter(|k| !k.is_empty()),
            speech_api_url: env_or("SPEECH_API_URL", "https://speech.googleapis.com"),
            tts_api_url: env_or("TTS_API_URL", "https://texttospeech.googleapis.com"),
        })
    }

    // Persistent state layout under the root.
    pub fn monitor_dir(&self) -> PathBuf {
        self.root.join("monitor")
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.root.join("recordings")
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.recordings_dir().join("converted")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.recordings_dir().join("transcripts")
    }

    pub fn responses_dir(&self) -> PathBuf {
        self.recordings_dir().join("responses")
    }

    pub fn generated_audio_dir(&self) -> PathBuf {
        self.recordings_dir().join("generated_audio")
    }

    pub fn processed_log_path(&self) -> PathBuf {
        self.recordings_dir().join("processed_files.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.recordings_dir().join("kisanvani.db")
    }

    /// Base language code of the pivot everything is translated through.
    pub fn pivot_language(&self) -> &'static str {
        "en"
    }

    /// Default reply language when detection gave nothing usable.
    pub fn default_reply_language(&self) -> String {
        self.primary_language
            .split('-')
            .next()
            .unwrap_or("hi")
            .to_string()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
        }),
        _ => Ok(default),
    }
}
