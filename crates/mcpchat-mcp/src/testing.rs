//! Scripted in-memory server used by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::{LaunchSpec, Launcher, Transport};

/// How the scripted server answers one request.
pub(crate) enum Reply {
    Result(Value),
    Error(i32, String),
    /// The next `receive` fails at the transport level.
    Broken,
    /// Never answer; `receive` waits forever.
    Hang,
}

type Handler = Arc<dyn Fn(&str, &Value) -> Reply + Send + Sync>;

/// A fake tool server. Cloning shares the counters.
#[derive(Clone)]
pub(crate) struct MockServer {
    handler: Handler,
    pub sent: Arc<Mutex<Vec<Value>>>,
    pub closes: Arc<AtomicUsize>,
    pub launches: Arc<AtomicUsize>,
    fail_launch: bool,
    fail_handshake: bool,
    noise: bool,
    launch_delay: Option<Duration>,
}

impl MockServer {
    /// `handler` answers every request except `initialize`.
    pub fn new(handler: impl Fn(&str, &Value) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            sent: Arc::default(),
            closes: Arc::default(),
            launches: Arc::default(),
            fail_launch: false,
            fail_handshake: false,
            noise: false,
            launch_delay: None,
        }
    }

    /// A server with two tools and one resource.
    pub fn standard() -> Self {
        Self::new(|method, params| match method {
            "tools/list" => Reply::Result(json!({
                "tools": [
                    {
                        "name": "read",
                        "description": "Read a file",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"path": {"type": "string", "description": "File path"}},
                            "required": ["path"]
                        }
                    },
                    {"name": "ping", "inputSchema": {"type": "object"}}
                ]
            })),
            "resources/list" => Reply::Result(json!({
                "resources": [{"uri": "file:///notes.txt", "name": "notes", "mimeType": "text/plain"}]
            })),
            "resources/read" => Reply::Result(json!({
                "contents": [{"uri": params["uri"], "mimeType": "text/plain", "text": "hello"}]
            })),
            "tools/call" => Reply::Result(json!({
                "content": [{"type": "text", "text": format!("called {}", params["name"].as_str().unwrap_or(""))}]
            })),
            other => Reply::Error(-32601, format!("Method not found: {}", other)),
        })
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn failing_handshake(mut self) -> Self {
        self.fail_handshake = true;
        self
    }

    /// Take `delay` to start.
    pub fn slow_launch(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    /// Precede every response with a banner line that is not JSON, a
    /// notification and a stray response.
    pub fn with_noise(mut self) -> Self {
        self.noise = true;
        self
    }

    pub fn launcher(&self) -> Arc<dyn Launcher> {
        Arc::new(self.clone())
    }

    /// Methods of every message sent by the client, in order.
    pub fn methods(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_string))
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }
}

#[async_trait]
impl Launcher for MockServer {
    async fn launch(&self, _spec: &LaunchSpec) -> Result<Box<dyn Transport>, TransportError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_launch {
            return Err(TransportError::SpawnFailed(std::io::Error::other("spawn refused")));
        }
        Ok(Box::new(MockTransport {
            server: self.clone(),
            inbox: VecDeque::new(),
            connected: true,
            hung: false,
        }))
    }
}

struct MockTransport {
    server: MockServer,
    inbox: VecDeque<Result<String, TransportError>>,
    connected: bool,
    hung: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let value: Value = serde_json::from_str(message).expect("client sent invalid JSON");
        self.server.sent.lock().unwrap().push(value.clone());

        let Some(id) = value.get("id").cloned() else {
            return Ok(());
        };
        let method = value["method"].as_str().unwrap_or_default();
        let params = value.get("params").cloned().unwrap_or(Value::Null);

        let reply = if method == "initialize" {
            if self.server.fail_handshake {
                Reply::Error(-32603, "handshake rejected".to_string())
            } else {
                Reply::Result(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "mock", "version": "0.0.1"}
                }))
            }
        } else {
            (self.server.handler)(method, &params)
        };

        if self.server.noise {
            self.inbox.push_back(Ok("server starting...".to_string()));
            self.inbox.push_back(Ok(
                json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info"}})
                    .to_string(),
            ));
            self.inbox
                .push_back(Ok(json!({"jsonrpc": "2.0", "id": 99_999, "result": {}}).to_string()));
        }

        let line = match reply {
            Reply::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Reply::Error(code, message) => {
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
            }
            Reply::Broken => {
                self.inbox.push_back(Err(TransportError::ReadError(std::io::Error::other(
                    "broken pipe",
                ))));
                return Ok(());
            }
            Reply::Hang => {
                self.hung = true;
                return Ok(());
            }
        };
        self.inbox.push_back(Ok(line.to_string()));
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.inbox.pop_front() {
            Some(message) => message,
            None if self.hung => std::future::pending().await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.connected {
            self.connected = false;
            self.server.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
