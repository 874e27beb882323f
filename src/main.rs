use anyhow::anyhow;
use anyhow::Context;
use config::Config;
use config::StorageConfig;
use dropshot::ConfigLogging;
use slog::info;
use std::sync::Arc;
use store::CounterStore;

mod config;
mod cors;
mod db;
mod http;
mod model;
mod pool;
mod schema;
mod store;

type DbConnection = diesel::PgConnection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    let config_logging = ConfigLogging::StderrTerminal { level: config.log_level };
    let config_dropshot = dropshot::ConfigDropshot {
        bind_address: config.bind_address,
        ..Default::default()
    };
    let log = config_logging
        .to_logger("counter-service")
        .context("creating logger")?;

    let store = create_store(&log, &config.storage).await?;
    let cors = cors::CorsPolicy::new(config.cors_origins.iter().cloned());
    info!(&log, "setting up dropshot server";
        "cors_origins" => ?config.cors_origins);
    let server = http::create_dropshot_server(
        config_dropshot,
        log.clone(),
        http::CounterContext::new(store, cors),
    )
    .await?;
    info!(&log, "set up dropshot server";
        "local_address" => ?server.local_addr());

    server.await.map_err(|error| anyhow!("waiting for server: {:#}", error))
}

async fn create_store(
    log: &slog::Logger,
    storage: &StorageConfig,
) -> anyhow::Result<Arc<dyn CounterStore>> {
    match storage {
        StorageConfig::Memory => {
            info!(log, "using in-memory counter");
            Ok(Arc::new(store::MemoryCounterStore::new()))
        }
        StorageConfig::Postgres { url, pool_size } => {
            info!(log, "using postgres counter"; "pool_size" => *pool_size);
            let pool = pool::create_pool(log.clone(), url, *pool_size)
                .await
                .context("setting up database pool")?;
            let store = db::PostgresCounterStore::bootstrap(log.clone(), pool)
                .await
                .context("initializing counter")?;
            Ok(Arc::new(store))
        }
    }
}
