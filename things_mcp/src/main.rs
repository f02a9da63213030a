use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use things_core::{
    build_connector,
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
    Config, Connector, LogLevel,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging needs the configured level, so load configuration first and
    // report a bad config once the subscriber exists.
    let config = Config::load();
    init_tracing(config.as_ref().map(|c| c.log_level).unwrap_or_default());

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        app = %config.things_app_name,
        mock_mode = config.mock_mode,
        timeout_secs = config.applescript_timeout,
        retry_count = config.applescript_retry_count,
        "Starting Things MCP server"
    );

    let connector: Arc<dyn Connector> = Arc::new(build_connector(&config));
    let server = McpServer::new(connector);
    let handler = JsonRpcHandler::new(server);
    let transport = StdioTransport::new(handler);

    info!("MCP server ready, listening on stdio");

    tokio::select! {
        result = transport.run() => {
            if let Err(e) = result {
                error!("Transport error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

/// stdout carries JSON-RPC, so logs go to stderr without colour.
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
