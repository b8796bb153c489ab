//! PDF Tools Server
//!
//! REST API for working with uploaded PDF documents:
//!
//! - PDF to DOCX conversion, returned directly or gated behind a mailed link
//! - Page inspection
//! - Split by page or by range, page extraction and merging
//!
//! ## Architecture
//!
//! Handlers parse multipart uploads and hand the heavy work to a bounded
//! [`pool::WorkerPool`]. Gated conversions are kept in an
//! [`download_gate::ArtifactRegistry`] until their owner redeems the signed
//! claim that was mailed to them.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use download_gate::{
    ArtifactRegistry, GraphConfig, GraphDirectory, GraphMailer, LogMailer, Mailer,
    PrincipalDirectory, ResendMailer, SigningKey, StaticDirectory, TokenService,
};
use tokio::signal;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod convert;
mod error;
mod pool;
mod state;
mod upload;

use api::{
    handle_convert, handle_convert_gated, handle_download, handle_extract_pages, handle_health,
    handle_info, handle_merge, handle_root, handle_split_pages, handle_split_ranges,
};
use config::Config;
use convert::CommandRenderer;
use pool::WorkerPool;
use state::{AppState, GatedDelivery};

/// Routes and middleware shared by the binary and the tests. Rate limiting is
/// added by `main` because it needs the peer address.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        // Conversion
        .route("/convert", post(handle_convert))
        .route("/convert/gated", post(handle_convert_gated))
        .route("/download", get(handle_download))
        // Page operations
        .route("/pdf/info", post(handle_info))
        .route("/pdf/split/pages", post(handle_split_pages))
        .route("/pdf/split/ranges", post(handle_split_ranges))
        .route("/pdf/extract/pages", post(handle_extract_pages))
        .route("/pdf/merge", post(handle_merge))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();

    // Initialize logging
    let log_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PDF tools server on {}:{}", config.host, config.port);

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("creating {}", config.work_dir.display()))?;
    tokio::fs::create_dir_all(&config.artifact_dir)
        .await
        .with_context(|| format!("creating {}", config.artifact_dir.display()))?;

    let renderer = CommandRenderer::from_command_line(&config.converter_command)
        .map_err(anyhow::Error::msg)?;
    let pool = WorkerPool::new(
        config.worker_threads,
        std::time::Duration::from_millis(config.job_timeout_ms),
    );
    info!("Worker pool: {} slots", pool.available());
    let ttl = chrono::Duration::minutes(config.token_ttl_minutes);
    let registry = Arc::new(ArtifactRegistry::new(ttl));

    let mut state = AppState::new(
        pool,
        Arc::new(renderer),
        registry.clone(),
        config.work_dir.clone(),
    );
    match build_gated_delivery(&config, ttl).await? {
        Some(gated) => state = state.with_gated_delivery(gated),
        None => warn!("JWT_SECRET not usable, gated delivery is disabled"),
    }

    let sweeper = registry
        .clone()
        .spawn_sweeper(std::time::Duration::from_secs(config.sweep_interval_secs));

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit.into())
            .burst_size(config.rate_limit * 2)
            .finish()
            .context("invalid rate limit")?,
    );

    let app = build_router(state, config.max_upload_mb * 1024 * 1024).layer(GovernorLayer {
        config: governor_conf,
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", config.rate_limit);
    info!("Job timeout: {}ms", config.job_timeout_ms);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    let removed = registry.clear().await;
    info!("Server shutdown complete, removed {} artifacts", removed);

    Ok(())
}

/// Token service, directory and mailer, or `None` when no usable secret is
/// configured
async fn build_gated_delivery(
    config: &Config,
    ttl: chrono::Duration,
) -> anyhow::Result<Option<GatedDelivery>> {
    let key = match config.jwt_secret.as_deref().map(SigningKey::new) {
        Some(Ok(key)) => key,
        Some(Err(e)) => {
            warn!("{}", e);
            return Ok(None);
        }
        None => return Ok(None),
    };

    let http = reqwest::Client::new();
    let graph = config
        .azure()
        .map(|(tenant_id, client_id, client_secret)| GraphConfig {
            tenant_id,
            client_id,
            client_secret,
        });

    let directory: Arc<dyn PrincipalDirectory> = match (&config.directory_file, &graph) {
        (Some(path), _) => {
            let directory = StaticDirectory::load(path).await?;
            info!("Principal directory: {} ({} entries)", path.display(), directory.len());
            Arc::new(directory)
        }
        (None, Some(graph)) => {
            info!("Principal directory: Microsoft Graph");
            Arc::new(GraphDirectory::new(http.clone(), graph.clone()))
        }
        (None, None) => {
            warn!("No principal directory configured, every gated request will be refused");
            Arc::new(StaticDirectory::default())
        }
    };

    let mailer: Arc<dyn Mailer> = match (&config.resend_api_key, &config.mail_sender, &graph) {
        (Some(api_key), Some(sender), _) => {
            info!("Mail delivery: Resend as {}", sender);
            Arc::new(ResendMailer::new(http.clone(), api_key, sender))
        }
        (None, Some(sender), Some(graph)) => {
            info!("Mail delivery: Microsoft Graph as {}", sender);
            Arc::new(GraphMailer::new(http.clone(), graph.clone(), sender))
        }
        _ => {
            warn!("No mail delivery configured, download links are only logged");
            Arc::new(LogMailer)
        }
    };

    Ok(Some(GatedDelivery {
        tokens: TokenService::new(key, ttl, config.redemption_policy),
        directory,
        mailer,
        public_url: config.public_url().to_string(),
        artifact_dir: config.artifact_dir.clone(),
    }))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
