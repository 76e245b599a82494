mod api;
mod router;
mod state;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use shopsight_athena::{AthenaConfig, AthenaRunner};
use shopsight_catalog::GlueCatalog;
use shopsight_core::Config;
use shopsight_llm::{create_provider, NlqModel};
use shopsight_nlq::{DynamoCache, NlqPipeline};
use shopsight_tenancy::DynamoShopDirectory;

use crate::state::AppState;

/// Wire the NLQ pipeline from config. Returns `None` (with a log line)
/// when a required piece is missing, so the server can still start and
/// answer health checks.
async fn build_pipeline(config: &Config) -> Option<NlqPipeline> {
    let athena_cfg = AthenaConfig::from_env();
    if !athena_cfg.is_configured() {
        info!("ATHENA_OUTPUT_LOCATION not set — NLQ pipeline disabled");
        return None;
    }

    let provider = match create_provider(&config.llm) {
        Ok(p) => p,
        Err(e) => {
            info!("LLM provider not configured ({}) — NLQ pipeline disabled", e);
            return None;
        }
    };
    let model = NlqModel::new(provider, config.llm.temperature, config.llm.max_tokens);

    let catalog = Arc::new(GlueCatalog::new(config.catalog.clone()).await);
    let directory = Arc::new(DynamoShopDirectory::new(config.stores.tenancy_table.clone()).await);
    let cache = Arc::new(
        DynamoCache::new(
            config.stores.cache_table.clone(),
            config.policy.cache_ttl_seconds,
        )
        .await,
    );
    let runner = Arc::new(AthenaRunner::new(athena_cfg).await);

    Some(NlqPipeline::new(
        catalog,
        directory,
        cache,
        model,
        runner,
        config.policy.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopsight_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.log_summary();

    let pipeline = build_pipeline(&config).await;
    let state = Arc::new(AppState { pipeline });

    let app = router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
