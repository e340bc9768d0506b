//! Text renderings served to front-ends and used to prime the LLM.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::McpError;
use crate::registry::ToolHost;

/// Tool block for one server: a header line followed by each rendered tool.
pub async fn render_server_tools(host: &dyn ToolHost, server: &str) -> Result<String, McpError> {
    let tools = host.list_tools(server).await?;
    let mut out = format!("Tools of MCP server '{}':\n", server);
    for tool in tools {
        out.push_str(&format!("{}\n", tool));
    }
    Ok(out)
}

/// Tool blocks for every server, in listing order.
///
/// A server whose listing fails contributes a one-line note instead.
pub async fn render_capability_catalog(host: &dyn ToolHost) -> String {
    let mut out = String::new();
    for server in host.list_servers() {
        match render_server_tools(host, &server).await {
            Ok(block) => out.push_str(&block),
            Err(err) => {
                warn!(server = %server, error = %err, "Leaving server out of the catalog");
                out.push_str(&format!("Tools of MCP server '{}' are unavailable: {}\n", server, err));
            }
        }
    }
    out
}

/// Execute a tool and return its stringified result, or a failure line.
pub async fn execute_to_text(
    host: &dyn ToolHost,
    server: &str,
    tool: &str,
    arguments: Map<String, Value>,
) -> String {
    match host.execute_tool(server, tool, arguments).await {
        Ok(result) => result.to_string(),
        Err(err) => format!("Failed to execute the tool: {}", err),
    }
}
