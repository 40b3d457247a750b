//! Main Entrypoint for the PhishShield API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the session store (and running migrations for Postgres).
//! 3. Initializing shared services (generation gateway, transcriber).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use phishshield_api::{
    config::{Config, StoreBackend},
    router::create_router,
    state::AppState,
    store::{MemoryStore, PgStore, SessionStore},
};
use phishshield_core::{
    generation::{BoundedGateway, GenerationGateway, ModelParams, OpenAICompatibleGateway},
    policy::ModePolicy,
    transcription::{HuggingFaceTranscriber, Transcriber},
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// How long open connections get to mark their sessions completed on shutdown.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Listens for the `Ctrl+C` signal and tells every connection to wind down.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
    }
    info!("Received shutdown signal. Shutting down gracefully...");
    let _ = shutdown_tx.send(true);
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

    // --- 3. Initialize Session Store ---
    let store: Arc<dyn SessionStore> = match &config.store {
        StoreBackend::Postgres { database_url } => {
            let pool = PgPool::connect(database_url)
                .await
                .context("Failed to connect to database")?;
            let store = PgStore::new(pool);
            store.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory session store; sessions are lost on restart.");
            Arc::new(MemoryStore::new())
        }
    };

    // --- 4. Initialize Shared Services ---
    info!(provider = ?config.provider, "Configuring generation gateway.");
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.api_key)
        .with_api_base(config.provider.api_base());
    let gateway: Arc<dyn GenerationGateway> = Arc::new(BoundedGateway::new(
        Arc::new(OpenAICompatibleGateway::new(openai_config)),
        config.generation_timeout,
    ));

    let transcriber: Option<Arc<dyn Transcriber>> = match &config.hf_token {
        Some(token) => Some(Arc::new(HuggingFaceTranscriber::new(
            token.clone(),
            config.transcription_model.clone(),
            config.transcription_fallback_model.clone(),
        ))),
        None => {
            warn!("HF_TOKEN is not set; the transcription endpoint will report an error.");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app_state = Arc::new(AppState {
        store,
        gateway,
        policy: Arc::new(ModePolicy::default()),
        model_params: ModelParams {
            model: config.chat_model.clone(),
            temperature: config.temperature,
        },
        transcriber,
        max_audio_bytes: config.max_audio_bytes,
        shutdown: shutdown_rx,
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
    .await?;

    // Each open connection holds a receiver; wait for them to finish.
    if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, shutdown_tx.closed())
        .await
        .is_err()
    {
        warn!("Some connections did not close in time.");
    }

    info!("Server has shut down.");
    Ok(())
}
