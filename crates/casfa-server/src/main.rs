//! Binary entry point: load configuration, wire the storage backend,
//! and serve the HTTP surface.

use std::sync::Arc;

use casfa_server::config::{CasfaConfig, StorageBackend};
use casfa_server::jwt::JwtValidator;
use casfa_server::mcp::ToolRegistry;
use casfa_server::node_reader::NullNodeReader;
use casfa_server::routes;
use casfa_server::state::AppState;
use casfa_store::{AuthCodeStore, CachingDelegateStore, DelegateStore, MemoryAuthCodeStore, MemoryDelegateStore, MemoryScopeSetStore, ScopeSetStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CasfaConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    casfa_server::known_clients::init(config.oauth.known_clients_path.as_deref());

    let (delegates, auth_codes, scope_sets): (Arc<dyn DelegateStore>, Arc<dyn AuthCodeStore>, Arc<dyn ScopeSetStore>) =
        match &config.storage.backend {
            StorageBackend::Memory => (
                Arc::new(MemoryDelegateStore::new()),
                Arc::new(MemoryAuthCodeStore::new()),
                Arc::new(MemoryScopeSetStore::new()),
            ),
            StorageBackend::Sqlite { database_url } => {
                use casfa_store::{SqliteAuthCodeStore, SqliteDelegateStore, SqliteScopeSetStore};
                use sqlx::sqlite::SqlitePoolOptions;

                let pool = SqlitePoolOptions::new().connect(database_url).await?;

                let delegate_store = SqliteDelegateStore::new(pool.clone());
                delegate_store.migrate().await?;
                let auth_code_store = SqliteAuthCodeStore::new(pool.clone());
                auth_code_store.migrate().await?;
                let scope_set_store = SqliteScopeSetStore::new(pool);
                scope_set_store.migrate().await?;

                (Arc::new(delegate_store), Arc::new(auth_code_store), Arc::new(scope_set_store))
            }
        };

    let delegates = if config.cache.redis_url.is_some() {
        tracing::info!(ttl_seconds = config.cache.ttl_seconds, "delegate lookup cache enabled");
        Arc::new(CachingDelegateStore::new(
            delegates,
            std::time::Duration::from_secs(config.cache.ttl_seconds),
        )) as Arc<dyn DelegateStore>
    } else {
        delegates
    };

    let jwt = JwtValidator::new(config.jwt.secret.clone(), config.jwt.issuer.clone(), config.jwt.audience.clone());

    let state = Arc::new(AppState {
        delegates,
        auth_codes,
        scope_sets,
        node_reader: Arc::new(NullNodeReader),
        jwt,
        tools: ToolRegistry::new(),
        config: config.clone(),
    });

    let app = routes::build(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(%addr, "starting casfa-server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
