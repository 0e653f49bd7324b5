use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use rmcp::{ServiceExt, transport::stdio};
use clap::Parser;
use brainbase_mcp::config::{BrainbaseConfig, RawConfig};
use brainbase_mcp::index::{IndexBuilder, IndexStore};
use brainbase_mcp::server::EntityTools;

#[cfg(feature = "trace")]
use tracing_subscriber::{EnvFilter};

#[derive(Parser)]
struct Cli {
    /// Where entities come from: filesystem, graphapi or hybrid
    #[clap(long, env = "BRAINBASE_ENTITY_SOURCE")]
    source_mode: Option<String>,
    /// Base URL of the Graph API (graphapi and hybrid modes)
    #[clap(long, env = "BRAINBASE_GRAPH_API_URL")]
    graph_api_url: Option<String>,
    /// Root of the codex directory (filesystem and hybrid modes)
    #[clap(long, env = "CODEX_PATH")]
    codex_path: Option<String>,
    /// Comma-separated project codes to keep from the Graph API (optional)
    #[clap(long, env = "BRAINBASE_PROJECT_CODES")]
    project_codes: Option<String>,
    /// Bearer token for the Graph API (optional)
    #[clap(long, env = "BRAINBASE_GRAPH_API_TOKEN", hide_env_values = true)]
    graph_api_token: Option<String>,
    /// Upper bound on one Graph API fetch, in seconds
    #[clap(long, default_value_t = 30)]
    request_timeout_secs: u64,
    /// File receiving the server log
    #[clap(long, default_value = "brainbase-mcp.log")]
    log_file: String,
}

/// You can inspect the server using the Model Context Protocol Inspector.
/// npx @modelcontextprotocol/inspector cargo run -p brainbase-mcp

#[tokio::main]
async fn main() -> Result<()> {
    // Get command line arguments
    let args = Cli::parse();

    // Log to a file, stdout carries the MCP transport
    #[cfg(feature = "trace")]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_writer(std::fs::File::create(&args.log_file)?)
        .with_ansi(false)
        .init();

    tracing::info!("Starting MCP server");

    let config = BrainbaseConfig::from_raw(RawConfig {
        source_mode: args.source_mode,
        graph_api_url: args.graph_api_url,
        codex_path: args.codex_path,
        project_codes: args.project_codes,
        graph_api_token: args.graph_api_token,
        request_timeout: Some(Duration::from_secs(args.request_timeout_secs)),
    })?;

    tracing::info!("Source mode: {}", config.source_mode);
    if let Some(url) = &config.graph_api_url {
        tracing::info!("Graph API URL: {}", url);
    }
    if let Some(path) = &config.codex_path {
        tracing::info!("Codex path: {}", path.display());
    }
    if !config.project_codes.is_empty() {
        tracing::info!("Project codes: {}", config.project_codes.join(", "));
    }

    let builder = IndexBuilder::from_config(&config)?;
    let store = IndexStore::open(builder).await.inspect_err(|e| {
        tracing::error!("Initial index build failed: {}", e);
    })?;

    for warning in &store.snapshot().await.warnings {
        tracing::warn!("{}", warning);
    }

    let service = EntityTools::new(Arc::new(store))
        .serve(stdio()).await.inspect_err(|e| {
            tracing::error!("serving error: {:?}", e);
        })?;

    service.waiting().await?;
    Ok(())
}
