//! BareRTC server bootstrap: loads configuration, wires the hub and its
//! collaborators, and spawns the four HTTP surfaces (WebSocket, long-poll,
//! admin, metrics) behind a shared shutdown signal.

use barertc::collaborators::{Collaborators, HistoryStore, ImageProcessor, JwtValidator, WebhookClient};
use barertc::config::Config;
use barertc::state::Hub;
use barertc::transport::{poll, socket};
use barertc::{admin, http, metrics};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        barertc::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        barertc::config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = barertc::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(server = %config.server.name, "starting BareRTC");

    metrics::init();

    let socket_bind = config.server.socket_bind.clone();
    let poll_bind = config.server.poll_bind.clone();
    let admin_bind = config.server.admin_bind.clone();
    let metrics_port = config.server.metrics_port;

    let jwt = JwtValidator::new(&config.jwt.secret);
    let webhook = WebhookClient::new();
    let image = ImageProcessor::default();
    let history = HistoryStore::connect(config.direct_message_history.enabled, &config.direct_message_history.path).await?;

    let hub = Arc::new(Hub::new(config));
    let collaborators = Arc::new(Collaborators { jwt, webhook, image, history });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Signal handler: SIGINT/SIGTERM both fan out the same shutdown broadcast
    // every background task and HTTP server below watches for.
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }

            let _ = shutdown_tx.send(());
        });
    }

    let socket_state = socket::SocketState { hub: hub.clone(), collaborators: collaborators.clone() };
    let poll_state = poll::PollState::new(hub.clone(), collaborators.clone());

    tokio::spawn(poll::run_idle_kicker(poll_state.clone(), shutdown_tx.subscribe()));
    tokio::spawn(serve(socket::router(socket_state), socket_bind, "websocket", shutdown_tx.subscribe()));
    tokio::spawn(serve(poll::router(poll_state), poll_bind, "long-poll", shutdown_tx.subscribe()));
    tokio::spawn(serve(
        admin::router(admin::AdminState { hub: hub.clone(), collaborators: collaborators.clone() }),
        admin_bind,
        "admin",
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(run_metrics_server(metrics_port, shutdown_tx.subscribe()));

    let mut shutdown_rx = shutdown_tx.subscribe();
    shutdown_rx.recv().await.ok();

    info!("disconnecting subscribers and draining in-flight requests");
    hub.broadcast(barertc::message::Envelope::chat_server_error("The chat server is shutting down."));
    for sub in hub.authenticated_snapshot() {
        sub.send(&barertc::message::Envelope::disconnect());
    }
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    Ok(())
}

/// Binds and serves `app` on `bind_addr`, stopping once `shutdown` fires.
async fn serve(app: axum::Router, bind_addr: String, label: &'static str, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %bind_addr, "failed to bind {label} server");
            return;
        }
    };
    info!(addr = %bind_addr, "{label} server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
        })
        .await;

    if let Err(e) = result {
        error!(error = %e, "{label} server error");
    }
}

async fn run_metrics_server(port: u16, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
    tokio::select! {
        _ = http::run_http_server(port) => {}
        _ = shutdown.recv() => {
            info!("metrics server shutting down");
        }
    }
}
