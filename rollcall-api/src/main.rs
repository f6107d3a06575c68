use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use rollcall_api::{app, AppState};
use rollcall_store::app_config::Config;
use rollcall_store::{DbClient, StoreAttendeeRepository, StoreEventRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Rollcall API on port {}", config.server.port);
    tracing::info!("{} event locations configured", config.locations.len());

    let app_state = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, &config.database)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            AppState::new(
                Arc::new(StoreAttendeeRepository::new(db.pool.clone())),
                Arc::new(StoreEventRepository::new(db.pool.clone())),
                &config,
            )?
        }
        None => {
            tracing::warn!("No database.url configured, using the in-memory store");
            AppState::in_memory(&config)?
        }
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
