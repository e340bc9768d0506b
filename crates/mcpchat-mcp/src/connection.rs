//! A session with one tool server.
//!
//! [`ServerConnection`] owns the transport to a single server and moves
//! through `Unconnected -> Initializing -> Ready -> Closed`. `Closed` is
//! terminal: a failed or torn-down connection is replaced, never restarted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mcpchat_core::ServerConfig;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::descriptor::{parse_uri, ResourceDescriptor, ToolDescriptor};
use crate::error::{McpError, TransportError};
use crate::protocol::{
    methods, CallToolParams, CallToolResult, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListResourcesResult, ListToolsResult,
    ReadResourceParams, ReadResourceResult, RequestId, ResourceContents, ServerInfo,
};
use crate::retry::RetryPolicy;
use crate::transport::{LaunchSpec, Launcher, StdioLauncher, Transport};

/// Lifecycle of a [`ServerConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Initializing,
    Ready,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Serialize)]
struct CursorParams {
    cursor: String,
}

/// Subprocess-backed session with one tool server.
pub struct ServerConnection {
    name: String,
    config: ServerConfig,
    launcher: Arc<dyn Launcher>,
    /// `None` before launch and after cleanup.
    transport: Mutex<Option<Box<dyn Transport>>>,
    state: RwLock<ConnectionState>,
    server_info: RwLock<Option<ServerInfo>>,
    request_counter: AtomicU64,
    /// Flipped to `true` once teardown starts; aborts requests in flight.
    closing: watch::Sender<bool>,
    /// Serializes teardown.
    cleanup_guard: Mutex<()>,
}

impl ServerConnection {
    /// Create a connection that launches servers as subprocesses.
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        Self::with_launcher(name, config, Arc::new(StdioLauncher))
    }

    pub fn with_launcher(
        name: impl Into<String>,
        config: ServerConfig,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            launcher,
            transport: Mutex::new(None),
            state: RwLock::new(ConnectionState::Unconnected),
            server_info: RwLock::new(None),
            request_counter: AtomicU64::new(1),
            closing: watch::Sender::new(false),
            cleanup_guard: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Server name and version reported during the handshake.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    /// Launch the server and perform the handshake.
    ///
    /// Only valid from `Unconnected`. On any failure the connection is
    /// cleaned up and left `Closed` before the error is returned.
    pub async fn initialize(&self) -> Result<(), McpError> {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Unconnected {
                return Err(McpError::connection(
                    &self.name,
                    McpError::protocol(format!("cannot initialize from state {}", *state)),
                ));
            }
            *state = ConnectionState::Initializing;
        }

        debug!(server = %self.name, command = %self.config.command, "Initializing MCP connection");

        match self.connect().await {
            Ok(info) => {
                info!(
                    server = %self.name,
                    server_name = %info.name,
                    server_version = info.version.as_deref().unwrap_or("unknown"),
                    "MCP connection ready"
                );
                *self.server_info.write().await = Some(info);
                let mut state = self.state.write().await;
                if *state != ConnectionState::Initializing {
                    // Torn down during the handshake; cleanup owns the transport.
                    return Err(McpError::connection(
                        &self.name,
                        McpError::protocol(format!("connection became {} during initialization", *state)),
                    ));
                }
                *state = ConnectionState::Ready;
                Ok(())
            }
            Err(err) => {
                warn!(server = %self.name, error = %err, "MCP initialization failed, cleaning up");
                if let Err(cleanup_err) = self.cleanup().await {
                    warn!(server = %self.name, error = %cleanup_err, "Cleanup after failed initialization also failed");
                }
                Err(err)
            }
        }
    }

    async fn connect(&self) -> Result<ServerInfo, McpError> {
        let spec = LaunchSpec::resolve(&self.config)?;

        let transport = self
            .launcher
            .launch(&spec)
            .await
            .map_err(|e| McpError::connection(&self.name, e.into()))?;

        {
            let mut slot = self.transport.lock().await;
            if *self.state.read().await != ConnectionState::Initializing {
                drop(slot);
                let mut transport = transport;
                if let Err(e) = transport.close().await {
                    warn!(server = %self.name, error = %e, "Failed to close transport launched after teardown");
                }
                return Err(McpError::connection(
                    &self.name,
                    TransportError::ConnectionClosed.into(),
                ));
            }
            *slot = Some(transport);
        }

        let result: InitializeResult = self
            .request(methods::INITIALIZE, Some(InitializeParams::default()))
            .await
            .map_err(|e| McpError::connection(&self.name, e))?;

        self.notify(methods::INITIALIZED)
            .await
            .map_err(|e| McpError::connection(&self.name, e))?;

        debug!(
            server = %self.name,
            protocol_version = %result.protocol_version,
            "Handshake complete"
        );

        Ok(result.server_info)
    }

    async fn ensure_ready(&self) -> Result<(), McpError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Ready {
            return Err(McpError::not_initialized(&self.name, state));
        }
        Ok(())
    }

    fn next_request_id(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and wait for its response, skipping notifications,
    /// responses to other ids and lines that are not JSON.
    ///
    /// Gives up with `ConnectionClosed` as soon as [`cleanup`](Self::cleanup)
    /// starts, releasing the transport lock so teardown never waits on a
    /// stalled server.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, McpError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = RequestId::from(self.next_request_id());
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let request_json = serde_json::to_string(&request)?;

        let mut closing = self.closing.subscribe();
        if *closing.borrow_and_update() {
            return Err(TransportError::ConnectionClosed.into());
        }

        tokio::select! {
            result = self.exchange(&id, method, &request_json) => result,
            _ = closing.changed() => {
                debug!(server = %self.name, method, "Request aborted by cleanup");
                Err(TransportError::ConnectionClosed.into())
            }
        }
    }

    async fn exchange<R>(&self, id: &RequestId, method: &str, request_json: &str) -> Result<R, McpError>
    where
        R: DeserializeOwned,
    {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(TransportError::NotConnected)?;

        transport.send(request_json).await?;

        loop {
            let line = transport.receive().await?;
            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!(server = %self.name, raw = %line, error = %e, "Skipping non-JSON output");
                    continue;
                }
            };

            let is_response = message.get("result").is_some() || message.get("error").is_some();
            let matches = message
                .get("id")
                .and_then(|v| RequestId::deserialize(v).ok())
                .is_some_and(|other| &other == id);

            if !(is_response && matches) {
                let other_method = message
                    .get("method")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("");
                debug!(server = %self.name, method = other_method, "Skipping unrelated message");
                continue;
            }

            let response: JsonRpcResponse<Value> = serde_json::from_value(message)
                .map_err(|e| McpError::protocol(format!("Malformed response: {}", e)))?;

            if let Some(error) = response.error {
                return Err(McpError::server_error(error.code, error.message));
            }

            let result = response
                .result
                .ok_or_else(|| McpError::protocol("Response missing result"))?;
            return serde_json::from_value(result)
                .map_err(|e| McpError::protocol(format!("Unexpected {} result: {}", method, e)));
        }
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let notification: JsonRpcNotification<Value> = JsonRpcNotification::new(method, None);
        let notification_json = serde_json::to_string(&notification)?;

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(TransportError::NotConnected)?;
        transport.send(&notification_json).await?;
        Ok(())
    }

    /// Follow `nextCursor` until the server stops paginating.
    async fn paginate<R, T>(
        &self,
        method: &str,
        mut split: impl FnMut(R) -> (Vec<T>, Option<String>),
    ) -> Result<Vec<T>, McpError>
    where
        R: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: R = self
                .request(method, cursor.take().map(|cursor| CursorParams { cursor }))
                .await?;
            let (batch, next) = split(page);
            items.extend(batch);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }
    }

    /// List the server's tools.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.ensure_ready().await?;
        debug!(server = %self.name, "Listing tools");

        let tools = self
            .paginate(methods::TOOLS_LIST, |page: ListToolsResult| {
                (page.tools, page.next_cursor)
            })
            .await?;

        debug!(server = %self.name, tool_count = tools.len(), "Listed tools");
        Ok(tools.into_iter().map(ToolDescriptor::from).collect())
    }

    /// List the server's resources. Entries with an invalid URI fail the call.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, McpError> {
        self.ensure_ready().await?;
        debug!(server = %self.name, "Listing resources");

        let resources = self
            .paginate(methods::RESOURCES_LIST, |page: ListResourcesResult| {
                (page.resources, page.next_cursor)
            })
            .await?;

        resources.into_iter().map(ResourceDescriptor::try_from).collect()
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        self.ensure_ready().await?;
        let uri = parse_uri(uri)?;
        debug!(server = %self.name, %uri, "Reading resource");

        let result: ReadResourceResult = self
            .request(
                methods::RESOURCES_READ,
                Some(ReadResourceParams {
                    uri: uri.to_string(),
                }),
            )
            .await?;
        Ok(result.contents)
    }

    /// Invoke a tool, retrying failed attempts per `policy`.
    ///
    /// A result flagged `isError` by the server is returned as is. Only
    /// session failures are retried; exhausting the attempts yields
    /// [`McpError::ToolExecution`] wrapping the last failure.
    pub async fn execute_tool(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
        policy: &RetryPolicy,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_ready().await?;
        info!(server = %self.name, tool, "Executing tool");

        let label = format!("{}/{}", self.name, tool);
        let result = policy
            .run(&label, |attempt| {
                let params = CallToolParams {
                    name: tool.to_string(),
                    arguments: arguments.clone(),
                };
                async move {
                    debug!(server = %self.name, tool, attempt, "Calling tool");
                    self.request::<_, CallToolResult>(methods::TOOLS_CALL, Some(params))
                        .await
                }
            })
            .await
            .map_err(|e| McpError::ToolExecution {
                tool: tool.to_string(),
                attempts: e.attempts,
                source: Box::new(e.last),
            })?;

        if result.is_error {
            warn!(server = %self.name, tool, "Tool reported an error");
        }
        Ok(result)
    }

    /// Close the session and stop the server.
    ///
    /// Safe to call repeatedly and from any state; the connection always ends
    /// `Closed`. Calls after the first successful one do nothing.
    pub async fn cleanup(&self) -> Result<(), McpError> {
        self.closing.send_replace(true);
        let _guard = self.cleanup_guard.lock().await;

        // `Closed` is published before the transport is taken so a
        // concurrent `initialize` cannot install a transport behind us.
        *self.state.write().await = ConnectionState::Closed;
        let transport = self.transport.lock().await.take();

        let Some(mut transport) = transport else {
            debug!(server = %self.name, "Nothing to clean up");
            return Ok(());
        };

        debug!(server = %self.name, "Closing MCP connection");
        transport.close().await?;
        info!(server = %self.name, "MCP connection closed");
        Ok(())
    }
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServer, Reply};
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::time::Instant;

    fn connection(server: &MockServer) -> ServerConnection {
        ServerConnection::with_launcher("mock", ServerConfig::new("mock-server"), server.launcher())
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready() {
        let server = MockServer::standard();
        let conn = connection(&server);
        assert_eq!(conn.state().await, ConnectionState::Unconnected);

        conn.initialize().await.unwrap();

        assert_eq!(conn.state().await, ConnectionState::Ready);
        assert_eq!(conn.server_info().await.unwrap().name, "mock");
        assert_eq!(server.methods(), vec!["initialize", "notifications/initialized"]);
    }

    #[tokio::test]
    async fn test_initialize_twice_is_rejected() {
        let server = MockServer::standard();
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let err = conn.initialize().await.unwrap_err();
        assert!(matches!(err, McpError::Connection { .. }));
        assert_eq!(server.launches.load(Ordering::SeqCst), 1);
        assert_eq!(conn.state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_closed() {
        let server = MockServer::standard().failing_launch();
        let conn = connection(&server);

        let err = conn.initialize().await.unwrap_err();
        assert!(matches!(err, McpError::Connection { .. }));
        assert_eq!(conn.state().await, ConnectionState::Closed);
        assert_eq!(server.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handshake_failure_releases_transport() {
        let server = MockServer::standard().failing_handshake();
        let conn = connection(&server);

        let err = conn.initialize().await.unwrap_err();
        match err {
            McpError::Connection { source, .. } => {
                assert!(matches!(*source, McpError::ServerError { code: -32603, .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(conn.state().await, ConnectionState::Closed);
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_command_is_configuration_error() {
        let server = MockServer::standard();
        let conn = ServerConnection::with_launcher("bad", ServerConfig::new(""), server.launcher());

        let err = conn.initialize().await.unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));
        assert_eq!(server.launches.load(Ordering::SeqCst), 0);
        assert_eq!(conn.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_operations_require_ready() {
        let server = MockServer::standard();
        let conn = connection(&server);

        assert!(matches!(
            conn.list_tools().await,
            Err(McpError::NotInitialized { .. })
        ));
        assert!(matches!(
            conn.execute_tool("read", Map::new(), &RetryPolicy::once()).await,
            Err(McpError::NotInitialized { .. })
        ));
        assert!(server.methods().is_empty());
    }

    #[tokio::test]
    async fn test_list_tools_and_resources() {
        let server = MockServer::standard().with_noise();
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let tools = conn.list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read", "ping"]);
        assert!(tools[0].parameters()[0].required);

        let resources = conn.list_resources().await.unwrap();
        assert_eq!(resources[0].uri.as_str(), "file:///notes.txt");

        let contents = conn.read_resource("file:///notes.txt").await.unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let server = MockServer::new(|method, params| match (method, params.get("cursor")) {
            ("tools/list", None) => Reply::Result(json!({
                "tools": [{"name": "a", "inputSchema": {}}],
                "nextCursor": "page-2"
            })),
            ("tools/list", Some(_)) => Reply::Result(json!({
                "tools": [{"name": "b", "inputSchema": {}}]
            })),
            _ => Reply::Error(-32601, "nope".to_string()),
        });
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let tools = conn.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(server.count("tools/list"), 2);
    }

    #[tokio::test]
    async fn test_read_resource_validates_uri() {
        let server = MockServer::standard();
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let err = conn.read_resource("no scheme here").await.unwrap_err();
        assert!(matches!(err, McpError::InvalidUri { .. }));
        assert_eq!(server.count("resources/read"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let server = MockServer::new(move |method, _| {
            if method != "tools/call" {
                return Reply::Error(-32601, "nope".to_string());
            }
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Reply::Broken,
                1 => Reply::Error(-32000, "busy".to_string()),
                _ => Reply::Result(json!({"content": [{"type": "text", "text": "ok"}]})),
            }
        });
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let start = Instant::now();
        let result = conn
            .execute_tool("write", args(json!({"path": "/x"})), &RetryPolicy::new(3, Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(result.to_string(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_single_attempt_failure() {
        let server = MockServer::new(|_, _| Reply::Error(-32000, "down".to_string()));
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let start = Instant::now();
        let err = conn
            .execute_tool("write", Map::new(), &RetryPolicy::new(1, Duration::from_secs(1)))
            .await
            .unwrap_err();

        match err {
            McpError::ToolExecution { attempts, source, .. } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, McpError::ServerError { code: -32000, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.count("tools/call"), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_tool_error_result_is_not_retried() {
        let server = MockServer::new(|_, _| {
            Reply::Result(json!({"content": [{"type": "text", "text": "denied"}], "isError": true}))
        });
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let result = conn
            .execute_tool("write", Map::new(), &RetryPolicy::new(3, Duration::ZERO))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(server.count("tools/call"), 1);
    }

    #[tokio::test]
    async fn test_execute_sends_arguments() {
        let server = MockServer::standard();
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        conn.execute_tool("read", args(json!({"path": "/x"})), &RetryPolicy::once())
            .await
            .unwrap();

        let sent = server.sent.lock().unwrap();
        let call = sent.iter().find(|m| m["method"] == "tools/call").unwrap();
        assert_eq!(call["params"], json!({"name": "read", "arguments": {"path": "/x"}}));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let server = MockServer::standard();
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        conn.cleanup().await.unwrap();
        conn.cleanup().await.unwrap();

        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
        assert_eq!(conn.state().await, ConnectionState::Closed);
        assert!(matches!(
            conn.list_tools().await,
            Err(McpError::NotInitialized { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_cleanup_closes_once() {
        let server = MockServer::standard();
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let (a, b) = tokio::join!(conn.cleanup(), conn.cleanup());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_json_output_is_skipped() {
        let server = MockServer::standard().with_noise();
        let conn = connection(&server);

        conn.initialize().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Ready);

        let result = conn
            .execute_tool("ping", Map::new(), &RetryPolicy::once())
            .await
            .unwrap();
        assert_eq!(result.to_string(), "called ping");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_during_launch_stays_closed() {
        let server = MockServer::standard().slow_launch(Duration::from_millis(50));
        let conn = connection(&server);

        let (init, cleanup) = tokio::join!(conn.initialize(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            conn.cleanup().await
        });

        assert!(cleanup.is_ok());
        assert!(matches!(init, Err(McpError::Connection { .. })));
        assert_eq!(conn.state().await, ConnectionState::Closed);
        assert_eq!(server.launches.load(Ordering::SeqCst), 1);
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
        assert!(!server.methods().contains(&"initialize".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_aborts_stalled_call() {
        let server = MockServer::new(|method, _| match method {
            "tools/call" => Reply::Hang,
            _ => Reply::Error(-32601, "nope".to_string()),
        });
        let conn = connection(&server);
        conn.initialize().await.unwrap();

        let policy = RetryPolicy::once();
        let (call, cleanup) = tokio::join!(
            conn.execute_tool("slow", Map::new(), &policy),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tokio::time::timeout(Duration::from_secs(2), conn.cleanup()).await
            }
        );

        assert!(matches!(cleanup, Ok(Ok(()))));
        match call {
            Err(McpError::ToolExecution { source, .. }) => assert!(matches!(
                *source,
                McpError::Transport(TransportError::ConnectionClosed)
            )),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(conn.state().await, ConnectionState::Closed);
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_before_initialize_is_terminal() {
        let server = MockServer::standard();
        let conn = connection(&server);

        conn.cleanup().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Closed);
        assert!(conn.initialize().await.is_err());
        assert_eq!(server.launches.load(Ordering::SeqCst), 0);
    }
}
