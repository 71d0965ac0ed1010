use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use restyle::sweeper::{self, SweeperConfig};
use restyle::transport::http::{ServerConfig, serve};
use restyle::{
    ArtifactStore, Config, OpenAiImages, StyleCatalog, TransformOrchestrator, TransformService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let catalog = match config.style_catalog.as_deref() {
        Some(path) => StyleCatalog::from_json_file(path)?,
        None => StyleCatalog::builtin(),
    };
    tracing::info!(styles = catalog.len(), "style catalog loaded");

    let api_key = config
        .api_key
        .clone()
        .context("OPENAI_API_KEY is not set")?;
    let generator = Arc::new(OpenAiImages::new(
        &config.api_base,
        api_key,
        config.model.clone(),
        config.provider_timeout,
    )?);

    let store = Arc::new(
        ArtifactStore::open(&config.data_dir)
            .with_context(|| format!("opening data dir {}", config.data_dir.display()))?,
    );
    let orchestrator = TransformOrchestrator::new(catalog, Arc::clone(&store), generator);
    let service = Arc::new(TransformService::new(orchestrator, Arc::clone(&store), &config));

    let _sweeper = sweeper::spawn(
        store,
        SweeperConfig {
            interval: config.sweep_interval,
            temp_ttl: config.temp_ttl,
            result_ttl: config.result_ttl,
        },
    );

    serve(
        ServerConfig {
            host: config.host.clone(),
            port: config.port,
        },
        service,
    )
    .await
}
