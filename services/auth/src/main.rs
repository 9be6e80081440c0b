use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use auth::{
    AppState, AuthEngine, AuthSettings, Collaborators,
    repositories::{PgLoginLogSink, PgUserRepository},
    routes,
};
use common::{
    cache::{RedisConfig, RedisPool},
    database,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

    let settings = AuthSettings::load()?;

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Initialize Redis connection pool
    let redis_config = RedisConfig::from_env()?;
    let store = Arc::new(RedisPool::new(&redis_config).await?);

    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let listen_addr = settings.listen_addr.clone();
    let (engine, worker) = AuthEngine::start(
        settings,
        Collaborators {
            store: store.clone(),
            users: users.clone(),
            permissions: users,
            login_log: Arc::new(PgLoginLogSink::new(pool.clone())),
        },
    )?;

    let app_state = AppState {
        engine: engine.clone(),
        store,
        db_pool: Some(pool),
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Authentication service listening on {}", listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drain queued audit entries before exiting
    engine.tasks().flush().await;
    drop(engine);
    worker.join().await;

    info!("Authentication service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
