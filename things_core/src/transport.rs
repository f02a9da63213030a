use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mcp_server::JsonRpcHandler;

/// Line-delimited JSON-RPC over stdin/stdout. Messages are handled one at a
/// time in arrival order.
pub struct StdioTransport {
    handler: JsonRpcHandler,
}

impl StdioTransport {
    pub fn new(handler: JsonRpcHandler) -> Self {
        Self { handler }
    }

    /// Runs until stdin closes.
    pub async fn run(&self) -> io::Result<()> {
        info!(target: "things::mcp", "starting stdio transport");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = AsyncBufReader::new(stdin);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(target: "things::mcp", "EOF on stdin");
                        break;
                    }
                    Ok(_) => {
                        if !line.trim().is_empty() && tx.send(line.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(target: "things::mcp", error = %e, "error reading stdin");
                        break;
                    }
                }
            }
        });

        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if let Some(response) = self.process_line(&line).await {
                write_response(&mut stdout, &response).await?;
            }
        }

        info!(target: "things::mcp", "stdio transport stopped");
        Ok(())
    }

    /// `None` when nothing should be written back (notifications).
    pub async fn process_line(&self, line: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handler.handle_request(request).await,
            Err(e) => {
                error!(target: "things::mcp", error = %e, "failed to parse JSON-RPC message");
                Some(serde_json::json!({
                    "jsonrpc": "2.0",
                    "error": {
                        "code": -32700,
                        "message": "Parse error",
                        "data": e.to_string()
                    },
                    "id": null
                }))
            }
        }
    }
}

async fn write_response<W>(out: &mut W, response: &Value) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let text = serde_json::to_string(response)?;
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    debug!(target: "things::mcp", bytes = text.len(), "sent response");
    Ok(())
}
