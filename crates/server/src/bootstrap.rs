use std::sync::Arc;

use callbridge_agent::{AgentError, AgentRuntime};
use callbridge_core::config::{AppConfig, ConfigError, LoadOptions, SessionBackend};
use callbridge_core::engine::ConversationEngine;
use callbridge_core::session::SessionStore;
use callbridge_core::CarrierBridge;
use callbridge_db::{connect, migrations, DbPool, InMemorySessionStore, SqlSessionStore};
use thiserror::Error;
use tracing::info;

pub type SharedStore = Arc<dyn SessionStore>;
pub type SharedEngine = Arc<dyn ConversationEngine>;
pub type SharedBridge = Arc<CarrierBridge<SharedStore, SharedEngine>>;

pub struct Application {
    pub config: AppConfig,
    /// Present only for the `sqlite` session backend.
    pub db_pool: Option<DbPool>,
    pub bridge: SharedBridge,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("engine initialization failed: {0}")]
    Engine(#[from] AgentError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        session_backend = ?config.session.backend,
        "starting application bootstrap"
    );

    let (store, db_pool): (SharedStore, Option<DbPool>) = match config.session.backend {
        SessionBackend::Memory => (Arc::new(InMemorySessionStore::new(config.session.ttl())), None),
        SessionBackend::Sqlite => {
            let pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "system.bootstrap.database_connected",
                correlation_id = "bootstrap",
                "database connection established"
            );

            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                correlation_id = "bootstrap",
                "database migrations applied"
            );
            (Arc::new(SqlSessionStore::new(pool.clone(), config.session.ttl())), Some(pool))
        }
    };

    let engine: SharedEngine = Arc::new(AgentRuntime::from_config(&config.engine)?);
    let bridge = Arc::new(CarrierBridge::new(store, engine, &config.carrier));

    Ok(Application { config, db_pool, bridge })
}
