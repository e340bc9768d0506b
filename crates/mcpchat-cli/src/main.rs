//! # mcpchat
//!
//! Command-line chat client for MCP tool servers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcpchat_agent::MediatorMode;
use mcpchat_core::error::format_error_with_suggestion;
use mcpchat_core::Config;

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
}

/// mcpchat - chat with an LLM that can call MCP tools
#[derive(Parser)]
#[command(name = "mcpchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tool server file in the mcpServers JSON shape
    #[arg(short, long, global = true, value_name = "FILE", env = "MCPCHAT_SERVERS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat using the function-calling channel
    Chat,
    /// Interactive chat with streamed replies
    Stream,
    /// List configured servers and their connection state
    Servers,
    /// Show the tools of one server
    Tools {
        /// Server name
        server: String,
    },
    /// Show the capability catalog used to prime the LLM
    Prompt,
    /// Execute one tool and print its result
    Exec {
        /// Server name
        server: String,
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },
    /// List the resources of one server
    Resources {
        /// Server name
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so replies on stdout stay clean.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match Config::load_validated(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_error_with_suggestion(&e));
            std::process::exit(2);
        }
    };
    let ctx = AppContext { config };

    match cli.command {
        Commands::Chat => commands::chat::run(&ctx, MediatorMode::Structured).await?,
        Commands::Stream => commands::chat::run(&ctx, MediatorMode::Streaming).await?,
        Commands::Servers => commands::inspect::servers(&ctx).await?,
        Commands::Tools { server } => commands::inspect::tools(&ctx, &server).await?,
        Commands::Prompt => commands::inspect::prompt(&ctx).await?,
        Commands::Exec { server, tool, args } => {
            commands::inspect::exec(&ctx, &server, &tool, &args).await?
        }
        Commands::Resources { server } => commands::inspect::resources(&ctx, &server).await?,
    }

    Ok(())
}
