//! Speech Synthesis Gateway
//!
//! Text-to-speech with an in-process audio cache, plus speech-to-text. Every
//! failure path returns `None`, which tells the caller to let the browser
//! handle speech locally.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Provider seam for speech audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Renders `text` with `voice`, returning MP3 bytes.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    /// Transcribes an audio upload to plain text.
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String>;
}

/// OpenAI `audio/speech` and `audio/transcriptions` over plain HTTP.
pub struct OpenAISpeechClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    tts_model: String,
    stt_model: String,
}

impl OpenAISpeechClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        tts_model: impl Into<String>,
        stt_model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            tts_model: tts_model.into(),
            stt_model: stt_model.into(),
        }
    }
}

#[async_trait]
impl SpeechProvider for OpenAISpeechClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "model": self.tts_model,
            "voice": voice,
            "input": text,
            "response_format": "mp3",
        });
        let response = self
            .http
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("TTS request failed")?
            .error_for_status()
            .context("TTS provider rejected the request")?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String> {
        let part = Part::bytes(audio).file_name(file_name.to_string());
        let form = Form::new()
            .text("model", self.stt_model.clone())
            .text("response_format", "text")
            .part("file", part);
        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Transcription request failed")?
            .error_for_status()
            .context("Transcription provider rejected the request")?;
        Ok(response.text().await?.trim().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub tts_enabled: bool,
    pub stt_enabled: bool,
    pub default_voice: String,
    pub cache_ttl: Duration,
    /// Directory rendered clips are written to.
    pub audio_dir: PathBuf,
    /// Public URL prefix the audio directory is served under.
    pub url_prefix: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            stt_enabled: true,
            default_voice: "alloy".to_string(),
            cache_ttl: Duration::from_secs(3600),
            audio_dir: PathBuf::from("./media/audio"),
            url_prefix: "/media/audio".to_string(),
        }
    }
}

/// A rendered clip and the URL it is served at.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub url: String,
    pub audio: Arc<Vec<u8>>,
}

struct CachedClip {
    clip: SpeechClip,
    inserted: Instant,
}

pub struct SpeechGateway {
    provider: Option<Arc<dyn SpeechProvider>>,
    settings: SpeechSettings,
    cache: Mutex<HashMap<String, CachedClip>>,
}

fn cache_key(text: &str, voice: &str) -> String {
    format!("{}_{}", hex::encode(Sha256::digest(text.as_bytes())), voice)
}

impl SpeechGateway {
    /// `provider` is `None` when no speech provider is configured.
    pub fn new(provider: Option<Arc<dyn SpeechProvider>>, settings: SpeechSettings) -> Self {
        Self {
            provider,
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn tts_available(&self) -> bool {
        self.settings.tts_enabled && self.provider.is_some()
    }

    pub fn stt_available(&self) -> bool {
        self.settings.stt_enabled && self.provider.is_some()
    }

    /// Returns the served URL for `text`, or `None` to signal client-side
    /// speech synthesis.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Option<String> {
        self.synthesize_clip(text, voice).await.map(|clip| clip.url)
    }

    /// Renders `text`, reusing a cached clip for the same text and voice
    /// within the TTL.
    pub async fn synthesize_clip(&self, text: &str, voice: Option<&str>) -> Option<SpeechClip> {
        if !self.settings.tts_enabled || text.trim().is_empty() {
            return None;
        }
        let provider = self.provider.as_ref()?;
        let voice = voice
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(self.settings.default_voice.as_str());
        let key = cache_key(text, voice);

        if let Some(clip) = self.cached(&key) {
            debug!(voice, "Returning cached TTS audio");
            return Some(clip);
        }

        let audio = match provider.synthesize(text, voice).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, voice, "TTS synthesis failed; deferring to client speech");
                return None;
            }
        };

        let url = match self.store(&audio).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Could not persist TTS audio");
                return None;
            }
        };

        let clip = SpeechClip {
            url,
            audio: Arc::new(audio),
        };
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                key,
                CachedClip {
                    clip: clip.clone(),
                    inserted: Instant::now(),
                },
            );
        info!(text_len = text.len(), voice, "Generated TTS audio");
        Some(clip)
    }

    /// Returns the transcript, or `None` to signal client-side recognition.
    pub async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Option<String> {
        if !self.settings.stt_enabled || audio.is_empty() {
            return None;
        }
        let provider = self.provider.as_ref()?;
        match provider.transcribe(audio, file_name).await {
            Ok(text) => {
                info!(transcript_len = text.len(), "Transcribed audio");
                Some(text)
            }
            Err(e) => {
                warn!(error = %e, "Transcription failed; deferring to client recognition");
                None
            }
        }
    }

    fn cached(&self, key: &str) -> Option<SpeechClip> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.settings.cache_ttl;
        cache.retain(|_, entry| entry.inserted.elapsed() < ttl);
        cache.get(key).map(|entry| entry.clip.clone())
    }

    async fn store(&self, audio: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.settings.audio_dir)
            .await
            .with_context(|| format!("creating {}", self.settings.audio_dir.display()))?;
        let file_name = format!("tts_{}.mp3", uuid::Uuid::new_v4());
        tokio::fs::write(self.settings.audio_dir.join(&file_name), audio).await?;
        Ok(format!(
            "{}/{}",
            self.settings.url_prefix.trim_end_matches('/'),
            file_name
        ))
    }
}
