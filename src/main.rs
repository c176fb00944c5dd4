//! Rate-limited proxy in front of the Gemini API for podcast scripts and speech.

mod config;
mod error;
mod gemini;
mod handlers;
mod metrics;
mod models;
mod prompt;
mod rate_limit;
mod routes;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Args;
use gemini::GeminiClient;
use rate_limit::{GENERATE_MESSAGE, GLOBAL_MESSAGE, RateLimiter};
use state::AppState;

// how often idle rate-limit windows are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podcast_proxy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments / environment
    let args = Args::parse();

    let gemini = GeminiClient::new(
        args.gemini_base_url.clone(),
        args.api_key.clone(),
        args.script_model.clone(),
        args.tts_model.clone(),
        args.upstream_timeout(),
    )?;

    let global_limiter = Arc::new(RateLimiter::new(
        "global",
        args.global_rate_limit,
        args.global_window(),
        GLOBAL_MESSAGE,
    ));
    let generate_limiter = Arc::new(RateLimiter::new(
        "generate",
        args.generate_rate_limit,
        args.generate_window(),
        GENERATE_MESSAGE,
    ));

    let state = Arc::new(AppState {
        gemini,
        global_limiter: Arc::clone(&global_limiter),
        generate_limiter: Arc::clone(&generate_limiter),
        allowed_origins: args.origins(),
        trust_proxy: args.trust_proxy,
    });

    // spawn the background sweeper
    tokio::spawn(rate_limit::sweeper(
        vec![global_limiter, generate_limiter],
        SWEEP_INTERVAL,
    ));

    let app = routes::create_router(Arc::clone(&state));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Proxy running on http://localhost:{}", args.port);
    info!("Forwarding to {}", args.gemini_base_url);
    info!("Allowed origins: {:?}", state.allowed_origins);
    info!(
        "Rate limits: {} requests per {}s globally, {} generations per {}s",
        args.global_rate_limit,
        args.global_rate_window,
        args.generate_rate_limit,
        args.generate_rate_window
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
