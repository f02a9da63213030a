// src/lib.rs
pub mod cache;
pub mod config;
pub mod connectors;
pub mod error;
pub mod logging;
pub mod mcp_server;
pub mod transport;
pub mod utils;

use async_trait::async_trait;
use std::sync::Arc;

// Re-export types from rmcp that users of this library need
pub use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    InitializeResult, ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities,
    Tool,
};

pub use crate::cache::{InvalidationScope, ResultCache};
pub use crate::config::{Config, TagCreationPolicy};
pub use crate::connectors::apple_common::{
    AppleScriptExecutor, DryRunRunner, ExecutionLock, ExecutionMethod, ExecutionResult,
    FailureKind, Invocation, OsascriptRunner, ScriptResult, ScriptRunner,
};
pub use crate::connectors::things::{ThingsConnector, ThingsService};
pub use crate::error::{ErrorCode, ErrorKind, ThingsError};
pub use crate::logging::LogLevel;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique connector name.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn capabilities(&self) -> ServerCapabilities;

    async fn initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ThingsError>;

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ThingsError>;

    async fn call_tool(&self, request: CallToolRequestParam)
        -> Result<CallToolResult, ThingsError>;
}

/// Wire the connector from configuration. The execution lock, the executor
/// and the cache are built here once and shared by every tool call.
pub fn build_connector(config: &Config) -> ThingsConnector {
    let runner: Arc<dyn ScriptRunner> = if config.mock_mode {
        Arc::new(DryRunRunner)
    } else {
        Arc::new(OsascriptRunner)
    };
    build_connector_with_runner(config, runner)
}

/// Same as [`build_connector`] with a caller-supplied runner.
pub fn build_connector_with_runner(
    config: &Config,
    runner: Arc<dyn ScriptRunner>,
) -> ThingsConnector {
    let executor = AppleScriptExecutor::new(runner, config, ExecutionLock::new());
    let cache = ResultCache::new(config.cache_max_size);
    ThingsConnector::new(ThingsService::new(executor, cache, config))
}
