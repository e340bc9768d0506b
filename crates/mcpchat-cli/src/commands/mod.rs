//! CLI command implementations.

pub mod chat;
pub mod inspect;

use std::future::Future;
use std::sync::Arc;

use mcpchat_mcp::ConnectionRegistry;
use tracing::{error, warn};

use crate::AppContext;

/// Build the registry from config and start every server.
///
/// Servers that fail to start are reported and left closed; the rest stay
/// usable.
pub async fn start_registry(ctx: &AppContext) -> Arc<ConnectionRegistry> {
    let registry = ConnectionRegistry::from_config(&ctx.config);

    let report = registry.start().await;
    for (server, err) in &report.failed {
        warn!(server = %server, error = %err, "Server unavailable");
        eprintln!("Warning: MCP server '{}' failed to start: {}", server, err);
    }
    Arc::new(registry)
}

/// Start the registry, run `body`, then shut the registry down whatever
/// `body` returned.
pub async fn with_registry<F, Fut, T>(ctx: &AppContext, body: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<ConnectionRegistry>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let registry = start_registry(ctx).await;
    let result = body(registry.clone()).await;

    if let Err(e) = registry.shutdown().await {
        error!(error = %e, "Shutdown incomplete");
        eprintln!("Warning: {}", e);
    }
    result
}
