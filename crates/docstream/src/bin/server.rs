//! Docstream server binary
//!
//! Run with: cargo run -p docstream --bin docstream-server

use docstream::{config::PipelineConfig, server::DocstreamServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docstream=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = PipelineConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Workers: {}", config.queue.worker_count());
    tracing::info!(
        "  - Chunk size: {} (overlap {})",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!(
        "  - Retries: {} attempts, {}ms base delay",
        config.queue.max_attempts,
        config.queue.retry_delay_ms
    );
    tracing::info!("  - Max upload: {} bytes", config.upload.max_file_size);

    // Create and start server
    let server = DocstreamServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/documents - Upload a document");
    println!("  GET  /api/documents - List documents");
    println!("  GET  /api/stream    - Live status events");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
