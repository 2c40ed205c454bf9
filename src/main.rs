//! # Speaking Feedback Backend - Main Application Entry Point
//!
//! HTTP service that listens to a learner's spoken English and returns a
//! structured critique: a corrected sentence, issues, alternatives, a practice
//! drill and a score.
//!
//! ## Request Pipeline:
//! 1. **audio**: normalize the browser upload (WebM/Opus, MP3, M4A, WAV) to 16kHz mono WAV
//! 2. **transcription**: Whisper speech-to-text on Candle
//! 3. **feedback**: prompt a local Ollama model and validate its JSON reply
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **state**: shared services and metrics
//! - **health**: `/health` and `/metrics`
//! - **middleware**: request logging and metrics
//! - **handlers**: `/feedback`, `/models`, `/models/change`
//! - **error**: HTTP error responses

mod audio;
mod config;
mod device;
mod error;
mod feedback;
mod handlers;
mod health;
mod llm;
mod middleware;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use audio::{FfmpegNormalizer, FormatNormalizer};
use config::AppConfig;
use feedback::FeedbackGenerator;
use llm::{LlmClient, OllamaClient};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{Transcriber, TranscriptionEngine};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Builds the services**: Ollama client, feedback generator, normalizer,
///    and the Whisper engine (downloaded on first run)
/// 4. **Serves HTTP** until SIGINT/SIGTERM, then shuts down gracefully
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting speaking-feedback-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let ollama = OllamaClient::new(
        &config.llm.base_url,
        Duration::from_secs(config.llm.request_timeout_secs),
    )?;
    info!(base_url = ollama.base_url(), model = %config.models.llm_model, "Using Ollama");
    let llm: Arc<dyn LlmClient> = Arc::new(ollama);

    let feedback = Arc::new(FeedbackGenerator::new(
        llm.clone(),
        &config.models.llm_model,
        config.llm.scoring_mode,
    ));

    let normalizer: Arc<dyn FormatNormalizer> = Arc::new(FfmpegNormalizer::new(config.audio.ffmpeg_path.clone()));

    let device = device::resolve_device(&config.stt.device);
    let transcriber: Arc<dyn Transcriber> = Arc::new(
        TranscriptionEngine::load(config.whisper_model()?, device, &config.stt.language)
            .await
            .context("Failed to load Whisper model")?,
    );

    let app_state = AppState::new(config.clone(), feedback, transcriber, normalizer, llm);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let allowed_origins = config.cors.allowed_origins.clone();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            // Middleware runs in reverse order of registration for requests.
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/models", web::get().to(handlers::list_models))
            .route("/models/change", web::post().to(handlers::change_models))
            .route("/feedback", web::post().to(handlers::create_feedback))
    })
    .bind(&bind_addr)?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "speaking_feedback_backend=trace")
/// - If not set, defaults to "speaking_feedback_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speaking_feedback_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolve when SIGINT (Ctrl+C) or, on Unix, SIGTERM arrives.
///
/// A handler that cannot be installed is logged and treated as never firing,
/// so the other signal still works.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
