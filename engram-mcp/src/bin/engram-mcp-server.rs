//! Line-delimited JSON-RPC server over stdio.
//!
//! One request per line on stdin, one response per line on stdout,
//! diagnostics on stderr. Set `ENGRAM_DB` to back metadata with a libSQL
//! file instead of process memory; set `ENGRAM_CONFIG` to load a TOML
//! configuration file.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use engram_core::config::EngramConfig;
use engram_core::engine::spawn_sweeper;
use engram_core::metadata::{MemoryMetadataStore, MetadataStore};
use engram_core::vector::{InMemoryVectorIndex, VectorStore};
use engram_mcp::jsonrpc::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, MAX_LINE_BYTES, MAX_RESPONSE_BYTES,
    PARSE_ERROR,
};
use engram_mcp::server::EngramMcpServer;
use engram_storage_libsql::{LibsqlConfig, LibsqlMetadataStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var("ENGRAM_CONFIG") {
        Ok(path) => EngramConfig::from_path(std::path::Path::new(&path))
            .with_context(|| format!("failed to load config from {path}"))?,
        Err(_) => EngramConfig::default(),
    };

    let metadata: Arc<dyn MetadataStore> = match std::env::var("ENGRAM_DB") {
        Ok(path) => {
            let store = LibsqlMetadataStore::open(&path, LibsqlConfig::default())
                .await
                .context("failed to open metadata database")?;
            store
                .initialize_schema()
                .await
                .context("failed to initialize schema")?;
            info!(path, "using libsql metadata store");
            Arc::new(store)
        }
        Err(_) => {
            info!("using in-memory metadata store");
            Arc::new(MemoryMetadataStore::new())
        }
    };
    let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorIndex::new());

    let server = EngramMcpServer::with_backends(config, metadata, vectors)
        .context("failed to build server")?;
    let _sweeper = spawn_sweeper(
        server.state().engine.clone(),
        std::time::Duration::from_secs(60),
    );
    info!("engram-mcp-server ready on stdio");

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = String::new();

    loop {
        line.clear();
        let n = stdin.read_line(&mut line).await?;
        if n == 0 {
            info!("stdin closed; shutting down");
            break;
        }
        if n > MAX_LINE_BYTES {
            write_response(
                &mut stdout,
                &JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(PARSE_ERROR, "request line too large"),
                ),
            )
            .await?;
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || !trimmed.starts_with('{') {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "failed to parse request");
                write_response(
                    &mut stdout,
                    &JsonRpcResponse::failure(
                        None,
                        JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
                    ),
                )
                .await?;
                continue;
            }
        };

        let shutting_down = request.method == "shutdown";
        if let Some(response) = server.handle_request(request).await {
            write_response(&mut stdout, &response).await?;
        }
        if shutting_down {
            info!("shutdown requested");
            break;
        }
    }

    Ok(())
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    response: &JsonRpcResponse,
) -> Result<()> {
    let mut body = serde_json::to_string(response).context("failed to serialize response")?;
    if body.len() > MAX_RESPONSE_BYTES {
        error!(bytes = body.len(), "response exceeds size cap");
        body = serde_json::to_string(&JsonRpcResponse::failure(
            None,
            JsonRpcError::new(
                engram_mcp::jsonrpc::INTERNAL_ERROR,
                "response exceeds size cap",
            ),
        ))
        .context("failed to serialize fallback response")?;
    }
    stdout.write_all(body.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
