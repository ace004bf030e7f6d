use doctor_core::{completion::CompletionSettings, speech::SpeechSettings};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// How chat replies are delivered over the realtime channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseMode {
    /// One `message` event per turn.
    Single,
    /// `stream_start`, chunks and TTS segments, then `stream_end`.
    Streaming,
}

/// Feature switches, all enabled by default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureFlags {
    pub openai_integration: bool,
    pub voice_chat: bool,
    pub text_to_speech: bool,
    pub speech_to_text: bool,
    pub avatar_integration: bool,
    pub gesture_responses: bool,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tts_model: String,
    pub tts_voice: String,
    pub whisper_model: String,
    pub max_conversation_history: usize,
    pub features: FeatureFlags,
    pub rate_limit_rpm: usize,
    pub rate_limit_tpm: usize,
    pub provider_concurrency: usize,
    pub response_mode: ResponseMode,
    pub tts_cache_ttl: Duration,
    pub audio_dir: PathBuf,
    pub media_url_prefix: String,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn flag(name: &str) -> Result<bool, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(true);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", raw),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let temperature = parse_var("OPENAI_TEMPERATURE", 0.7f32)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "OPENAI_TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=2.0", temperature),
            ));
        }

        let features = FeatureFlags {
            openai_integration: flag("ENABLE_OPENAI_INTEGRATION")?,
            voice_chat: flag("ENABLE_VOICE_CHAT")?,
            text_to_speech: flag("ENABLE_TEXT_TO_SPEECH")?,
            speech_to_text: flag("ENABLE_SPEECH_TO_TEXT")?,
            avatar_integration: flag("ENABLE_AVATAR_INTEGRATION")?,
            gesture_responses: flag("ENABLE_GESTURE_RESPONSES")?,
        };

        let response_mode_str = var_or("RESPONSE_MODE", "single");
        let response_mode = match response_mode_str.to_lowercase().as_str() {
            "single" => ResponseMode::Single,
            "streaming" | "stream" => ResponseMode::Streaming,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "RESPONSE_MODE".to_string(),
                    format!("'{}' is not 'single' or 'streaming'", response_mode_str),
                ));
            }
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            database_url,
            openai_api_key,
            openai_api_base: var_or("OPENAI_API_BASE", "https://api.openai.com/v1"),
            chat_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            temperature,
            max_tokens: parse_var("OPENAI_MAX_TOKENS", 1000)?,
            tts_model: var_or("OPENAI_TTS_MODEL", "tts-1"),
            tts_voice: var_or("OPENAI_TTS_VOICE", "alloy"),
            whisper_model: var_or("OPENAI_WHISPER_MODEL", "whisper-1"),
            max_conversation_history: parse_var("MAX_CONVERSATION_HISTORY", 10)?,
            features,
            rate_limit_rpm: parse_var("OPENAI_RATE_LIMIT_RPM", 60)?,
            rate_limit_tpm: parse_var("OPENAI_RATE_LIMIT_TPM", 10_000)?,
            provider_concurrency: parse_var("PROVIDER_CONCURRENCY", 8)?,
            response_mode,
            tts_cache_ttl: Duration::from_secs(parse_var("TTS_CACHE_TTL_SECS", 3600)?),
            audio_dir: PathBuf::from(var_or("AUDIO_DIR", "./media/audio")),
            media_url_prefix: var_or("MEDIA_URL_PREFIX", "/media/audio"),
            log_level,
        })
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.chat_model.clone(),
            max_tokens: self.max_tokens,
            history_window: self.max_conversation_history,
            requests_per_minute: self.rate_limit_rpm,
            tokens_per_minute: self.rate_limit_tpm,
            max_concurrent_requests: self.provider_concurrency,
        }
    }

    pub fn speech_settings(&self) -> SpeechSettings {
        SpeechSettings {
            tts_enabled: self.features.text_to_speech,
            stt_enabled: self.features.speech_to_text,
            default_voice: self.tts_voice.clone(),
            cache_ttl: self.tts_cache_ttl,
            audio_dir: self.audio_dir.clone(),
            url_prefix: self.media_url_prefix.clone(),
        }
    }

    /// The provider key, when provider calls are both enabled and possible.
    pub fn active_api_key(&self) -> Option<&str> {
        if self.features.openai_integration {
            self.openai_api_key.as_deref()
        } else {
            None
        }
    }
}
