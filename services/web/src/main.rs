use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
};
use web::{
    AppState,
    config::AppConfig,
    routes, schema,
    session::{MemorySessionStore, RedisSessionStore, SessionStore},
};

const SESSION_SWEEP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize logging
    let default_level = if config.debug { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting HairyMada web service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    schema::ensure_schema(&pool, db_config.backend()?).await?;

    // Sessions live in Redis when it is configured
    let sessions: Arc<dyn SessionStore> = match RedisConfig::from_env() {
        Some(redis_config) => {
            let redis_pool = RedisPool::new(&redis_config).await?;
            if !redis_pool.health_check().await? {
                anyhow::bail!("Failed to connect to Redis");
            }
            info!("Using Redis session store");
            Arc::new(RedisSessionStore::new(redis_pool))
        }
        None => {
            warn!("REDIS_URL not set, sessions are kept in memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    // Periodically drop expired sessions
    let sweeper = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_SWEEP_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.cleanup_expired_sessions().await {
                error!("Failed to clean up expired sessions: {:#}", e);
            }
        }
    });

    let bind_address = config.bind_address();
    info!("Public URL: {}", config.url);
    let app_state = AppState::new(config, pool, sessions)?;

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&bind_address).await?;
    info!("HairyMada web service listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
