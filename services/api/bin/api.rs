//! Main Entrypoint for the AI Doctor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Choosing the conversation store (Postgres when configured, else in-memory).
//! 3. Initializing the completion and speech gateways.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use doctor_api::{
    config::Config, db::Db, memory_store::InMemoryStore, router::create_router, state::AppState,
};
use doctor_core::{
    completion::CompletionGateway,
    gestures::GestureLibrary,
    llm_client::{LLMClient, OpenAICompatibleClient, SamplingParams},
    speech::{OpenAISpeechClient, SpeechGateway, SpeechProvider},
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Persistence ---
    let (store, gestures): (
        Arc<dyn doctor_api::db::ConversationStore>,
        Arc<dyn GestureLibrary>,
    ) = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let db = Arc::new(Db::new(pool));
            db.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            (db.clone() as _, db as _)
        }
        None => {
            warn!("DATABASE_URL not set; conversations are kept in memory only.");
            let memory = Arc::new(InMemoryStore::new());
            (memory.clone() as _, memory as _)
        }
    };

    // --- 4. Initialize Provider Gateways ---
    let (llm_client, speech_provider): (
        Option<Arc<dyn LLMClient>>,
        Option<Arc<dyn SpeechProvider>>,
    ) = match config.active_api_key() {
        Some(api_key) => {
            info!(model = %config.chat_model, "Using OpenAI provider.");
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(&config.openai_api_base);
            let llm = OpenAICompatibleClient::new(
                openai_config,
                SamplingParams {
                    model: config.chat_model.clone(),
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                },
            );
            let speech = OpenAISpeechClient::new(
                &config.openai_api_base,
                api_key,
                &config.tts_model,
                &config.whisper_model,
            );
            (
                Some(Arc::new(llm) as Arc<dyn LLMClient>),
                Some(Arc::new(speech) as Arc<dyn SpeechProvider>),
            )
        }
        None => {
            warn!("OpenAI integration disabled or OPENAI_API_KEY missing; using canned replies.");
            (None, None)
        }
    };

    tokio::fs::create_dir_all(&config.audio_dir)
        .await
        .with_context(|| format!("Failed to create audio directory {:?}", config.audio_dir))?;

    let completion = Arc::new(CompletionGateway::new(
        llm_client,
        config.completion_settings(),
    ));
    let speech = Arc::new(SpeechGateway::new(speech_provider, config.speech_settings()));
    let config = Arc::new(config);
    let app_state = Arc::new(AppState::new(
        store,
        gestures,
        completion,
        speech,
        config.clone(),
    ));

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        response_mode = ?config.response_mode,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
