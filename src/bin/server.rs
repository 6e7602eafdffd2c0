//! Ingestion service binary
//!
//! Run with: cargo run --bin marshal-rag-server

use marshal_rag::providers::Embedder;
use marshal_rag::{config::ServiceConfig, server::IngestServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marshal_rag=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("MARSHAL_RAG_CONFIG") {
        Ok(path) => ServiceConfig::from_file(std::path::Path::new(&path))?,
        Err(_) => {
            let mut config = ServiceConfig::default();
            config.apply_env();
            config
        }
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - embedding model: {}", config.embedding.model);
    tracing::info!("  - vector dimension: {}", config.embedding.dimension);
    tracing::info!("  - chunk size: {} tokens", config.chunking.chunk_size);
    tracing::info!("  - chunk overlap: {} tokens", config.chunking.chunk_overlap);
    tracing::info!("  - embed batch size: {}", config.embedding.batch_size);

    let server = IngestServer::new(config)?;

    // A degraded embedder only affects ingestion throughput; the server
    // still comes up and retries via the pipeline's backoff.
    match server.state().embedder().health_check().await {
        Ok(true) => tracing::info!("Embedder reachable"),
        _ => tracing::warn!(
            "Embedder '{}' not reachable; embed jobs will retry with backoff",
            server.state().embedder().name()
        ),
    }

    tracing::info!("Starting ingestion server on http://{}", server.address());
    server.start().await?;
    Ok(())
}
