//! Named collection of server connections.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use mcpchat_core::{Config, ServerConfig};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::connection::{ConnectionState, ServerConnection};
use crate::descriptor::{ResourceDescriptor, ToolDescriptor};
use crate::error::McpError;
use crate::protocol::{CallToolResult, ResourceContents};
use crate::retry::RetryPolicy;
use crate::transport::{Launcher, StdioLauncher};

/// Discovery and dispatch by server name.
///
/// The mediator and the text surface depend on this rather than on the
/// registry itself.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Configured server names, in a stable order.
    fn list_servers(&self) -> Vec<String>;

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, McpError>;

    async fn execute_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError>;
}

/// Outcome of [`ConnectionRegistry::start`].
#[derive(Debug, Default)]
pub struct StartReport {
    pub ready: Vec<String>,
    pub failed: Vec<(String, McpError)>,
}

impl StartReport {
    /// True when every server reached `Ready`.
    pub fn all_ready(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns one [`ServerConnection`] per configured server.
pub struct ConnectionRegistry {
    connections: BTreeMap<String, ServerConnection>,
    retry: RetryPolicy,
}

impl ConnectionRegistry {
    /// Build connections for `servers`. Nothing is launched yet.
    pub fn new(servers: &BTreeMap<String, ServerConfig>) -> Self {
        Self::with_launcher(servers, Arc::new(StdioLauncher))
    }

    pub fn with_launcher(
        servers: &BTreeMap<String, ServerConfig>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let connections = servers
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    ServerConnection::with_launcher(name.clone(), config.clone(), launcher.clone()),
                )
            })
            .collect();

        Self {
            connections,
            retry: RetryPolicy::default(),
        }
    }

    /// Build from the loaded configuration, including its retry settings.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.mcp_servers).with_retry_policy(RetryPolicy::from_config(&config.retry))
    }

    /// Policy used by [`ConnectionRegistry::execute_tool`].
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn list_servers(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connection(&self, server: &str) -> Result<&ServerConnection, McpError> {
        self.connections
            .get(server)
            .ok_or_else(|| McpError::UnknownServer(server.to_string()))
    }

    pub async fn connection_state(&self, server: &str) -> Result<ConnectionState, McpError> {
        Ok(self.connection(server)?.state().await)
    }

    /// Initialize every connection concurrently.
    ///
    /// Best-effort: a failing server does not stop the others. It is left
    /// `Closed`, reported in the [`StartReport`], and its later operations
    /// fail with [`McpError::NotInitialized`].
    pub async fn start(&self) -> StartReport {
        info!(servers = self.connections.len(), "Starting MCP servers");

        let outcomes = join_all(self.connections.iter().map(|(name, conn)| async move {
            (name.clone(), conn.initialize().await)
        }))
        .await;

        let mut report = StartReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => report.ready.push(name),
                Err(err) => {
                    error!(server = %name, error = %err, "MCP server failed to start");
                    report.failed.push((name, err));
                }
            }
        }

        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            "MCP servers started"
        );
        report
    }

    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        info!(server, "Listing tools of MCP server");
        self.connection(server)?.list_tools().await
    }

    pub async fn list_resources(&self, server: &str) -> Result<Vec<ResourceDescriptor>, McpError> {
        self.connection(server)?.list_resources().await
    }

    pub async fn read_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<Vec<ResourceContents>, McpError> {
        self.connection(server)?.read_resource(uri).await
    }

    /// Execute with the registry's default retry policy.
    pub async fn execute_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        self.execute_tool_with(server, tool, arguments, &self.retry).await
    }

    pub async fn execute_tool_with(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
        policy: &RetryPolicy,
    ) -> Result<CallToolResult, McpError> {
        self.connection(server)?
            .execute_tool(tool, arguments, policy)
            .await
    }

    /// Clean up every connection. All connections are attempted; failures are
    /// collected into [`McpError::Shutdown`].
    pub async fn shutdown(&self) -> Result<(), McpError> {
        let outcomes = join_all(self.connections.iter().map(|(name, conn)| async move {
            (name.clone(), conn.cleanup().await)
        }))
        .await;

        let failures: Vec<(String, McpError)> = outcomes
            .into_iter()
            .filter_map(|(name, outcome)| outcome.err().map(|err| (name, err)))
            .collect();

        if failures.is_empty() {
            info!("All MCP servers shut down");
            Ok(())
        } else {
            for (name, err) in &failures {
                error!(server = %name, error = %err, "MCP server cleanup failed");
            }
            Err(McpError::Shutdown(failures))
        }
    }
}

#[async_trait]
impl ToolHost for ConnectionRegistry {
    fn list_servers(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        self.connection(server)?.list_tools().await
    }

    async fn execute_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        self.execute_tool_with(server, tool, arguments, &self.retry)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockServer;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn servers(names: &[&str]) -> BTreeMap<String, ServerConfig> {
        names
            .iter()
            .map(|name| (name.to_string(), ServerConfig::new("mock-server")))
            .collect()
    }

    #[test]
    fn test_list_servers_is_stable_and_exact() {
        let server = MockServer::standard();
        let registry = ConnectionRegistry::with_launcher(&servers(&["zeta", "alpha", "mid"]), server.launcher());

        let first = registry.list_servers();
        assert_eq!(first, vec!["alpha", "mid", "zeta"]);
        assert_eq!(registry.list_servers(), first);
        assert_eq!(ToolHost::list_servers(&registry), first);
        assert_eq!(server.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_and_dispatch() {
        let server = MockServer::standard();
        let registry = ConnectionRegistry::with_launcher(&servers(&["fs", "db"]), server.launcher());

        let report = registry.start().await;
        assert!(report.all_ready());
        assert_eq!(report.ready.len(), 2);

        let tools = registry.list_tools("fs").await.unwrap();
        assert_eq!(tools.len(), 2);

        let args = json!({"path": "/x"}).as_object().cloned().unwrap();
        let result = registry.execute_tool("db", "read", args).await.unwrap();
        assert_eq!(result.to_string(), "called read");

        assert_eq!(
            registry.connection_state("fs").await.unwrap(),
            ConnectionState::Ready
        );
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let registry = ConnectionRegistry::with_launcher(&servers(&["fs"]), MockServer::standard().launcher());
        registry.start().await;

        assert!(matches!(
            registry.list_tools("nope").await,
            Err(McpError::UnknownServer(name)) if name == "nope"
        ));
        assert!(matches!(
            registry.execute_tool("nope", "read", Map::new()).await,
            Err(McpError::UnknownServer(_))
        ));
        assert!(matches!(
            registry.read_resource("nope", "file:///a").await,
            Err(McpError::UnknownServer(_))
        ));
    }

    #[tokio::test]
    async fn test_start_is_best_effort() {
        let good = MockServer::standard();
        let bad = MockServer::standard().failing_handshake();

        let mut registry = ConnectionRegistry::with_launcher(&servers(&["good"]), good.launcher());
        registry.connections.insert(
            "bad".to_string(),
            ServerConnection::with_launcher("bad", ServerConfig::new("mock-server"), bad.launcher()),
        );

        let report = registry.start().await;
        assert_eq!(report.ready, vec!["good"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");

        assert_eq!(registry.connection_state("bad").await.unwrap(), ConnectionState::Closed);
        assert!(matches!(
            registry.list_tools("bad").await,
            Err(McpError::NotInitialized { .. })
        ));
        assert!(registry.list_tools("good").await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything_once() {
        let server = MockServer::standard();
        let registry = ConnectionRegistry::with_launcher(&servers(&["a", "b", "c"]), server.launcher());
        registry.start().await;

        registry.shutdown().await.unwrap();
        registry.shutdown().await.unwrap();

        assert_eq!(server.closes.load(Ordering::SeqCst), 3);
        for name in registry.list_servers() {
            assert_eq!(registry.connection_state(&name).await.unwrap(), ConnectionState::Closed);
        }
    }

    #[test]
    fn test_from_config_uses_retry_settings() {
        let mut config = Config::default();
        config.retry.attempts = 5;
        config
            .mcp_servers
            .insert("fs".to_string(), ServerConfig::new("cat"));

        let registry = ConnectionRegistry::from_config(&config);
        assert_eq!(registry.retry_policy().max_attempts, 5);
        assert_eq!(registry.len(), 1);
    }
}
