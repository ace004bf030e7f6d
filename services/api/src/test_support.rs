//! Fakes and an app builder shared by the crate's unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use doctor_core::{
    completion::CompletionGateway,
    gestures::{GestureDescriptor, GestureLibrary},
    history::ChatMessage,
    llm_client::{CompletionFormat, LLMClient, LLMStream, LLMStreamEvent},
    speech::{SpeechGateway, SpeechProvider},
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::{
    config::{Config, FeatureFlags, ResponseMode},
    db::ConversationStore,
    memory_store::InMemoryStore,
    models::{ConversationTurn, MedicalContext, MedicalContextPayload, NewTurn, Session},
    state::AppState,
};

#[derive(Clone)]
enum Script {
    Reply(String),
    Chunks(Vec<String>),
    Fail,
    Panic,
}

/// An `LLMClient` that answers from a script and records every prompt.
#[derive(Clone)]
pub struct ScriptedLlm {
    script: Script,
    prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedLlm {
    fn new(script: Script) -> Self {
        Self {
            script,
            prompts: Arc::default(),
        }
    }

    pub fn reply(raw: &str) -> Self {
        Self::new(Script::Reply(raw.to_string()))
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::new(Script::Chunks(chunks.iter().map(|c| c.to_string()).collect()))
    }

    pub fn failing() -> Self {
        Self::new(Script::Fail)
    }

    pub fn panicking() -> Self {
        Self::new(Script::Panic)
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, messages: Vec<ChatMessage>) {
        self.prompts.lock().unwrap().push(messages);
    }
}

#[async_trait]
impl LLMClient for ScriptedLlm {
    async fn complete(&self, messages: Vec<ChatMessage>, _format: CompletionFormat) -> Result<String> {
        self.record(messages);
        match &self.script {
            Script::Reply(raw) => Ok(raw.clone()),
            Script::Chunks(chunks) => Ok(chunks.concat()),
            Script::Fail => Err(anyhow!("provider unavailable")),
            Script::Panic => panic!("scripted provider panic"),
        }
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<LLMStream> {
        self.record(messages);
        let chunks = match &self.script {
            Script::Reply(raw) => vec![raw.clone()],
            Script::Chunks(chunks) => chunks.clone(),
            Script::Fail => return Err(anyhow!("provider unavailable")),
            Script::Panic => panic!("scripted provider panic"),
        };
        let events: Vec<Result<LLMStreamEvent>> = chunks
            .into_iter()
            .map(|c| Ok(LLMStreamEvent::TextChunk(c)))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}

/// A `SpeechProvider` returning fixed audio and counting calls.
#[derive(Clone, Default)]
pub struct FakeSpeech {
    synthesize_calls: Arc<Mutex<usize>>,
}

impl FakeSpeech {
    pub fn synthesize_calls(&self) -> usize {
        *self.synthesize_calls.lock().unwrap()
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>> {
        *self.synthesize_calls.lock().unwrap() += 1;
        Ok(text.as_bytes().to_vec())
    }

    async fn transcribe(&self, audio: Vec<u8>, _file_name: &str) -> Result<String> {
        String::from_utf8(audio).map_err(Into::into)
    }
}

/// A store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl ConversationStore for FailingStore {
    async fn get_or_create_session(&self, _id: &str) -> Result<Session> {
        Err(anyhow!("database unavailable"))
    }

    async fn add_turn(&self, _turn: NewTurn) -> Result<ConversationTurn> {
        Err(anyhow!("database unavailable"))
    }

    async fn recent_turns(&self, _session_id: &str, _limit: i64) -> Result<Vec<ConversationTurn>> {
        Err(anyhow!("database unavailable"))
    }

    async fn medical_context(&self, _session_id: &str) -> Result<Option<MedicalContext>> {
        Err(anyhow!("database unavailable"))
    }

    async fn upsert_medical_context(
        &self,
        _session_id: &str,
        _payload: MedicalContextPayload,
    ) -> Result<MedicalContext> {
        Err(anyhow!("database unavailable"))
    }
}

#[async_trait]
impl GestureLibrary for FailingStore {
    async fn find_gesture(&self, _name: &str) -> Result<Option<GestureDescriptor>> {
        Err(anyhow!("database unavailable"))
    }
}

pub fn test_config(audio_dir: &Path) -> Config {
    Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url: None,
        openai_api_key: None,
        openai_api_base: "http://localhost:0".to_string(),
        chat_model: "gpt-4o-mini".to_string(),
        temperature: 0.7,
        max_tokens: 1000,
        tts_model: "tts-1".to_string(),
        tts_voice: "alloy".to_string(),
        whisper_model: "whisper-1".to_string(),
        max_conversation_history: 10,
        features: FeatureFlags {
            openai_integration: true,
            voice_chat: true,
            text_to_speech: true,
            speech_to_text: true,
            avatar_integration: true,
            gesture_responses: true,
        },
        rate_limit_rpm: 60,
        rate_limit_tpm: 100_000,
        provider_concurrency: 4,
        response_mode: ResponseMode::Single,
        tts_cache_ttl: Duration::from_secs(3600),
        audio_dir: audio_dir.to_path_buf(),
        media_url_prefix: "/media/audio".to_string(),
        log_level: tracing::Level::DEBUG,
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub memory: Arc<InMemoryStore>,
    _audio_dir: TempDir,
}

#[derive(Default)]
pub struct TestAppBuilder {
    llm: Option<ScriptedLlm>,
    speech: Option<FakeSpeech>,
    failing_store: bool,
    configure: Option<Box<dyn FnOnce(&mut Config)>>,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }
}

impl TestAppBuilder {
    pub fn llm(mut self, llm: ScriptedLlm) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn speech(mut self, speech: FakeSpeech) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.failing_store = true;
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut Config) + 'static) -> Self {
        self.configure = Some(Box::new(f));
        self
    }

    pub fn build(self) -> TestApp {
        let audio_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(audio_dir.path());
        if let Some(configure) = self.configure {
            configure(&mut config);
        }

        let completion = CompletionGateway::new(
            self.llm.map(|llm| Arc::new(llm) as Arc<dyn LLMClient>),
            config.completion_settings(),
        );
        let speech = SpeechGateway::new(
            self.speech.map(|s| Arc::new(s) as Arc<dyn SpeechProvider>),
            config.speech_settings(),
        );

        let memory = Arc::new(InMemoryStore::new());
        let (store, gestures): (Arc<dyn ConversationStore>, Arc<dyn GestureLibrary>) =
            if self.failing_store {
                (Arc::new(FailingStore) as _, Arc::new(FailingStore) as _)
            } else {
                (memory.clone() as _, memory.clone() as _)
            };

        TestApp {
            state: Arc::new(AppState::new(
                store,
                gestures,
                Arc::new(completion),
                Arc::new(speech),
                Arc::new(config),
            )),
            memory,
            _audio_dir: audio_dir,
        }
    }
}
