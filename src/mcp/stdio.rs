// src/mcp/stdio.rs
// Newline-delimited JSON-RPC over stdin/stdout. The reader admits multiple
// in-flight requests; a single writer task serializes responses in
// completion order so lines never interleave. stderr carries logs.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::Result;
use crate::mcp::dispatch::{McpEngine, RequestContext};
use crate::mcp::rpc::{INVALID_REQUEST, JsonRpcRequest, JsonRpcResponse};
use crate::tenancy::TenantScope;

/// Run the stdio transport until EOF or a shutdown notification. `scope`
/// is pinned at process start (CLI flags or environment).
pub async fn serve(engine: Arc<McpEngine>, scope: Result<TenantScope>) -> anyhow::Result<()> {
    // Readiness goes to stderr; stdout is reserved for the wire.
    eprintln!("MCP server ready (stdio mode)");
    serve_streams(engine, scope, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Transport loop over arbitrary byte streams. Split out from `serve` so
/// the line protocol is testable without a process boundary.
pub async fn serve_streams<R, W>(
    engine: Arc<McpEngine>,
    scope: Result<TenantScope>,
    reader: R,
    writer: W,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    // Writer task: sole owner of the output stream.
    let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
    let writer_task = tokio::spawn(async move {
        let mut out = writer;
        while let Some(line) = write_rx.recv().await {
            if out.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if out.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = out.flush().await;
        }
    });

    let shutdown = engine.shutdown_token();
    let scope = scope.map_err(Arc::new);
    let mut in_flight = JoinSet::new();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break; // EOF
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "Unparseable request line");
                let response =
                    JsonRpcResponse::error(None, INVALID_REQUEST, format!("invalid request: {e}"));
                let _ = write_tx.send(serde_json::to_string(&response)?).await;
                continue;
            }
        };

        let engine = engine.clone();
        let write_tx = write_tx.clone();
        let ctx = RequestContext::new(
            scope
                .clone()
                .map_err(|e| crate::error::ServerError::TenantUnresolved(e.to_string())),
        );
        in_flight.spawn(async move {
            if let Some(response) = engine.handle(request, ctx).await {
                match serde_json::to_string(&response) {
                    Ok(line) => {
                        let _ = write_tx.send(line).await;
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize response"),
                }
            }
        });

        // Opportunistically reap finished tasks so the set stays small.
        while in_flight.try_join_next().is_some() {}
    }

    // Drain: finish in-flight work, then let the writer flush and exit.
    while in_flight.join_next().await.is_some() {}
    drop(write_tx);
    let _ = writer_task.await;
    debug!("stdio transport drained");
    Ok(())
}
