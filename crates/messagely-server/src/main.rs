mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use messagely_api::auth::{AppState, AppStateInner};
use messagely_db::{Database, Hasher};

use crate::config::{Config, DEV_JWT_SECRET};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "messagely=debug,messagely_api=debug,messagely_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret == DEV_JWT_SECRET {
        warn!("MESSAGELY_JWT_SECRET is unset; using the development placeholder");
    }

    // Init database
    let db = Database::open(&config.db_path)?;
    let hasher = Hasher::new(config.work_factor)?;
    info!(
        "Password hashing: argon2id m={}KiB t={} p={}",
        config.work_factor.memory_kib, config.work_factor.iterations, config.work_factor.parallelism
    );

    let state: AppState = Arc::new(AppStateInner {
        db,
        hasher,
        jwt_secret: config.jwt_secret,
        token_ttl: config.token_ttl,
    });

    let app = messagely_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Messagely server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
