//! Inspection commands over the tool servers.

use anyhow::Context;
use mcpchat_mcp::{execute_to_text, render_capability_catalog, render_server_tools};
use serde_json::{Map, Value};

use super::with_registry;
use crate::AppContext;

pub async fn servers(ctx: &AppContext) -> anyhow::Result<()> {
    with_registry(ctx, |registry| async move {
        if registry.is_empty() {
            println!("No MCP servers configured.");
            return Ok(());
        }

        println!("Configured MCP servers:");
        for name in registry.list_servers() {
            let connection = registry.connection(&name)?;
            let state = connection.state().await;
            let config = connection.config();
            print!("  {} [{}] {}", name, state, config.command);
            for arg in &config.args {
                print!(" {}", arg);
            }
            println!();
            if let Some(info) = connection.server_info().await {
                println!("      {} {}", info.name, info.version.unwrap_or_default());
            }
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn tools(ctx: &AppContext, server: &str) -> anyhow::Result<()> {
    with_registry(ctx, |registry| async move {
        let text = render_server_tools(registry.as_ref(), server).await?;
        print!("{}", text);
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn prompt(ctx: &AppContext) -> anyhow::Result<()> {
    with_registry(ctx, |registry| async move {
        print!("{}", render_capability_catalog(registry.as_ref()).await);
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn exec(ctx: &AppContext, server: &str, tool: &str, args: &str) -> anyhow::Result<()> {
    let arguments = parse_arguments(args)?;
    with_registry(ctx, |registry| async move {
        println!("{}", execute_to_text(registry.as_ref(), server, tool, arguments).await);
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn resources(ctx: &AppContext, server: &str) -> anyhow::Result<()> {
    with_registry(ctx, |registry| async move {
        let resources = registry.list_resources(server).await?;
        if resources.is_empty() {
            println!("Server '{}' has no resources.", server);
        }
        for resource in resources {
            println!("{}", resource);
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
}

fn parse_arguments(args: &str) -> anyhow::Result<Map<String, Value>> {
    serde_json::from_str(args).with_context(|| format!("arguments must be a JSON object, got: {}", args))
}
