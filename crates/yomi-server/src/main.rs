//! yomi server binary: the text-to-speech bot process.
//!
//! Starts the HTTP control surface with structured logging, restores
//! sessions from their leases, and shuts down gracefully on SIGTERM/SIGINT
//! without dropping the leases, so the next process rejoins.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use yomi_server::{app, background, bootstrap, config};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("YOMI_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the bot cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let services = bootstrap::build(&config)
        .expect("failed to initialize services, check presets, engines and database.path");

    let (stop_tx, stop_rx) = watch::channel(false);
    let heartbeat = services.persistence.as_ref().map(|persistence| {
        let heartbeat = persistence.start_heartbeat(stop_rx.clone());
        (persistence, heartbeat)
    });
    if let Some((persistence, _)) = &heartbeat {
        bootstrap::restore_sessions(&services.state, persistence).await;
    }

    tokio::spawn(background::start_kv_purge_task(
        services.kv.clone(),
        background::DEFAULT_PURGE_INTERVAL,
    ));

    // Build application
    let router = services.state.router.clone();
    let app = app(services.state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting yomi server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Leases stay in the store for the next process to restore.
    router.close_all().await;
    stop_tx.send_replace(true);
    if let Some((_, handle)) = heartbeat {
        let _ = handle.await;
    }

    tracing::info!("yomi server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
