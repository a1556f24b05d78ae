//! Worklog server binary.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, the live broadcaster, and graceful shutdown on
//! SIGTERM/SIGINT.

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use worklog_server::{app, config, AppState};

#[derive(Parser)]
#[command(name = "worklog-server", about = "Personal status log with live streaming")]
struct Cli {
    /// Listen address, `host:port` or `:port`
    #[arg(long)]
    addr: Option<String>,
    /// Shared secret; enables single-user shared-token mode
    #[arg(long)]
    token: Option<String>,
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<String>,
}

fn resolve_config_path(cli: &Cli) -> (Option<String>, &'static str) {
    if let Some(path) = cli.config.clone().filter(|value| !value.trim().is_empty()) {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("WORKLOG_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let (resolved_config_path, config_source) = resolve_config_path(&cli);
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let mut config = config::load_config(selected_config_path)
        .expect("failed to load configuration");
    config
        .apply_cli(cli.addr.as_deref(), cli.token.clone())
        .expect("invalid --addr");
    config.validate().expect("invalid configuration");

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
        auth_mode = ?config.auth.mode,
        "resolved startup configuration"
    );

    // Initialize database
    let pool = worklog_db::create_pool(
        &config.database.path,
        worklog_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool, check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = worklog_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Build application
    let state = AppState::from_config(pool, &config);
    let broadcaster = state.broadcaster.clone();
    let app = app(state);
    let addr = config.listen_addr();

    tracing::info!(%addr, "starting worklog server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    // Open SSE streams only end once their mailboxes close, so the
    // broadcaster is stopped before axum waits for connections to drain.
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            broadcaster.shutdown().await;
        })
        .await
        .expect("server error");

    tracing::info!("worklog server shut down");
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
