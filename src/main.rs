mod companion_api;
mod config;
mod domain;
mod error;
mod progress;
mod session;
// full platform surface; the companion routes use a subset
#[allow(dead_code)]
mod shelf_client;
mod storage;

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use companion_api::{CompanionApi, SessionRegistry};
use config::Config;
use migration::MigratorTrait;
use poem::{
    EndpointExt, Route, Server,
    listener::TcpListener,
    middleware::{Cors, Tracing as PoemTracing},
};
use poem_openapi::OpenApiService;
use progress::{ProgressTracker, ReadingPolicy};
use sea_orm::Database;
use session::{SessionContext, SessionManager};
use shelf_client::ShelfClient;
use storage::SqliteSessionStore;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder, prelude::*};

type ShelfSyncResult<T> = anyhow::Result<T>;

#[tokio::main]
async fn main() -> ShelfSyncResult<()> {
    // Respect RUST_LOG if set, default to info for our crate and warn for deps.
    let default_filter = format!(
        "{}=info,poem=info,reqwest=warn,h2=warn",
        env!("CARGO_PKG_NAME")
    );
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_level(true)
        .pretty()
        .finish()
        .with(ErrorLayer::default())
        .init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting shelf sync");

    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let db_conn = Database::connect(&config.db_connection_string)
        .await
        .with_context(|| "Failed to connect to database")?;

    migration::Migrator::up(&db_conn, None)
        .await
        .with_context(|| "Failed to run database migrations")?;

    let context = SessionContext::default();
    let client = ShelfClient::new(&config.api_base_url)?
        .with_timeout(Duration::from_secs(config.request_timeout_secs))?
        .with_asset_host(&config.asset_host)
        .with_session(context);
    tracing::info!(api_base = %config.api_base_url, asset_host = %config.asset_host, "configured book platform client");

    let store = Arc::new(SqliteSessionStore::new(db_conn));
    let sessions = Arc::new(SessionManager::new(client.clone(), store));
    let tracker = ProgressTracker::new(
        Arc::new(client),
        ReadingPolicy::new(config.minutes_per_page),
    );

    if let Some(user) = sessions.init().await {
        if let Err(e) = sessions.ensure_fresh().await {
            tracing::warn!(error = %e, "stored session could not be refreshed");
        }
        match tracker.refresh().await {
            Ok(snapshot) => {
                tracing::info!(user_id = user.id, entries = snapshot.entries.len(), "library loaded")
            }
            Err(e) => tracing::warn!(error = %e, "initial library fetch failed"),
        }
    }

    let registry = Arc::new(SessionRegistry::default());
    spawn_idle_sweep(
        registry.clone(),
        Duration::from_secs(config.session_idle_secs),
    );

    run_poem(sessions, tracker, registry, Arc::new(config)).await?;
    Ok(())
}

/// Periodically close sessions whose view went away without closing them.
fn spawn_idle_sweep(registry: Arc<SessionRegistry>, max_idle: Duration) {
    let period = (max_idle / 4).max(Duration::from_secs(15));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let closed = registry.close_idle(max_idle);
            if !closed.is_empty() {
                tracing::info!(
                    flushed = closed.len(),
                    still_open = registry.open_count(),
                    "idle sessions closed"
                );
            }
        }
    });
}

pub async fn run_poem(
    sessions: Arc<SessionManager>,
    tracker: ProgressTracker,
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
) -> ShelfSyncResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    let api = CompanionApi {
        sessions,
        tracker,
        registry,
    };
    let api_service = OpenApiService::new(api, "Shelf Sync companion API", version)
        .server(format!("http://{}", config.bind_addr));
    let ui = api_service.rapidoc();
    let spec = api_service.spec();
    let route = Route::new()
        .nest("/", api_service)
        .nest("/ui", ui)
        .nest("/spec", poem::endpoint::make_sync(move |_| spec.clone()))
        .with(Cors::new())
        .with(PoemTracing);

    let bind_addr = config.bind_addr.clone();
    tracing::info!(%bind_addr, "starting HTTP server");
    Server::new(TcpListener::bind(bind_addr)).run(route).await?;
    Ok(())
}
