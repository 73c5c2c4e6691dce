//! Conversion server binary
//!
//! Run with: cargo run -p rag-convert --bin rag-convert-server

use rag_convert::{config::ServiceConfig, server::ConvertServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_convert=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                       RAG Convert                         ║
║        Document to Markdown and Chunking Service          ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let config = ServiceConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Tokenizer: {}", config.chunking.tokenizer_model);
    match &config.chunking.tokenizer_path {
        Some(path) => tracing::info!("  - Tokenizer file: {}", path.display()),
        None => tracing::info!("  - Tokenizer file: none (word-boundary counting)"),
    }
    tracing::info!("  - Max tokens: {}", config.chunking.max_tokens);
    tracing::info!("  - Workspace: {}", config.processing.workspace_dir.display());
    tracing::info!("  - Concurrent jobs: {}", config.processing.worker_count());

    // Create and start server
    let server = ConvertServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /convert               - File to Markdown");
    println!("  POST   /convert-chunked       - File to chunks (sync)");
    println!("  POST   /convert-chunked-async - File to chunks (background job)");
    println!("  POST   /convert-multiple      - Up to 10 files, ZIP or JSON");
    println!("  GET    /job/:id               - Poll a job");
    println!("  DELETE /job/:id               - Delete a job");
    println!("  GET    /jobs                  - List jobs");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
