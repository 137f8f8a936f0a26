//! Loyalty Points Service
//!
//! HTTP server for customer registration, purchases and point balances

use anyhow::{Context, Result};
use loyalty_service::{
    create_router, AppState, Config, MemorySessionStore, RedisSessionStore, SessionBackend,
    SessionStore, Sessions, StaticCredentials, Storage,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often abandoned in-memory sessions are swept
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loyalty_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Loyalty Service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Database URL: {}", config.database_url);
    info!("Session backend: {:?}", config.session_backend);

    // Initialize storage
    let storage = Storage::connect(&config.database_url)
        .await
        .context("Failed to initialize storage")?;

    let store: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::Redis => Arc::new(
            RedisSessionStore::new(&config.redis_url)
                .await
                .context("Failed to initialize session store")?,
        ),
    };
    let sessions = Sessions::new(store, config.session_ttl());

    let authenticator = StaticCredentials::new(
        config.admin_username.clone(),
        config.admin_password.clone(),
    );
    if !authenticator.is_configured() {
        warn!("ADMIN_PASSWORD is not set, admin login is disabled");
    }

    // Sweep expired sessions in the background
    let sweeper = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match sweeper.purge_expired().await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired sessions", n),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    });

    // Create application state
    let state = AppState::new(
        storage,
        sessions,
        Arc::new(authenticator),
        config.static_dir.clone(),
    );

    // Create router
    let app = create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.address()))?;

    info!("Loyalty Service running on http://{}", config.address());

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
