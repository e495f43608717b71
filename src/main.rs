//! Action gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ axum server ──▶ route table ──▶ middleware chain ──▶ method filter ──▶ action
//!                    (request id,    (method, path)   timing                 (GET/POST/WS)    envelope
//!                     trace, body                     recovery                                 data only
//!                     limit)                          traffic guard                            content
//!                                                     access log                               websocket
//!
//!     Client Response
//!     ◀────────────── {"ErrCod", "Desc", "Data"} envelope (or raw content, or upgraded session)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use action_gateway::admin::{setup_admin_router, AdminState};
use action_gateway::config::loader::{apply_env_overrides, load_config, ConfigError};
use action_gateway::config::validation::validate_config;
use action_gateway::config::{RunMode, ServerConfig};
use action_gateway::lifecycle::signals::spawn_signal_listener;
use action_gateway::observability::{logging, metrics};
use action_gateway::{
    ActionError, ActionPackage, ActionResult, ActionRouter, HttpServer, Shutdown, WsSession,
};

#[derive(Parser)]
#[command(name = "action-gateway", version, about = "HTTP/WebSocket action gateway")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in deployment mode (hide internal error details).
    #[arg(long)]
    deploy: bool,
}

/// `GET /api/echo?a=<text>` answers with `<text>` as data.
async fn echo(pkg: ActionPackage) -> ActionResult {
    Ok(pkg.responder().ok_with_data(pkg.form_value("a")))
}

/// `WS /api/echo/ws` sends every text frame back.
async fn echo_ws(_pkg: ActionPackage, session: WsSession) -> Result<(), ActionError> {
    loop {
        let text = session.read_text().await?;
        session.write_text(text).await?;
    }
}

fn build_config(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = ServerConfig::default();
            apply_env_overrides(&mut config);
            config
        }
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if cli.deploy {
        config.run_mode = RunMode::Deployment;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    logging::init_logging(&config.observability, config.run_mode)?;
    tracing::info!("action-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        run_mode = ?config.run_mode,
        default_freq = config.traffic.default_freq,
        policy = ?config.traffic.policy,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let actions = ActionRouter::with_standard_chain(&config);
    actions.add_group("/api", |g| {
        g.get("/echo", echo);
        g.ws("/echo/ws", echo_ws);
        Ok(())
    });
    actions.register_all()?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    if config.admin.enabled {
        let admin = setup_admin_router(AdminState::new(&config.admin.api_key, config.run_mode, &actions));
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server_shutdown = shutdown.subscribe();
    HttpServer::new(config, &actions)
        .run(listener, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
