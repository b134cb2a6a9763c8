//! # courier-api — Binary Entry Point
//!
//! Starts the Axum HTTP server. Storage is Postgres when `DATABASE_URL` is
//! set and in-memory otherwise.

use std::sync::Arc;

use clap::{Parser, ValueEnum};

use courier_api::gateway::GatewayConfig;
use courier_api::repo::{MemoryRepository, PgRepository, ShipmentRepository};
use courier_api::state::{AppConfig, AppState};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Courier backend API server.
#[derive(Parser)]
#[command(name = "courier-api", version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Shared bearer secret. Authentication is disabled when unset.
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Postgres connection string. In-memory storage when unset.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Key secret for checkout signature verification.
    #[arg(long, env = "GATEWAY_KEY_SECRET", hide_env_values = true)]
    gateway_key_secret: Option<String>,

    /// Secret for webhook body signatures.
    #[arg(long, env = "GATEWAY_WEBHOOK_SECRET", hide_env_values = true)]
    gateway_webhook_secret: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = AppConfig {
        port: args.port,
        auth_token: args.auth_token,
        gateway: GatewayConfig {
            key_secret: args.gateway_key_secret,
            webhook_secret: args.gateway_webhook_secret,
        },
    };
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set; every request runs as super admin");
    }
    if config.gateway.key_secret.is_none() {
        tracing::warn!("GATEWAY_KEY_SECRET not set; payment verification returns 503");
    }

    let pool = courier_api::db::init_pool(args.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "database initialization failed");
            e
        })?;
    let repo: Arc<dyn ShipmentRepository> = match pool {
        Some(pool) => Arc::new(PgRepository::new(pool)),
        None => Arc::new(MemoryRepository::new()),
    };

    let state = AppState::with_repository(repo, config);
    let app = courier_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!(%addr, "courier API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
