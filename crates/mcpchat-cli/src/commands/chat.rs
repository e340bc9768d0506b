//! Interactive chat in either mediator mode.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use futures::{pin_mut, StreamExt};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use mcpchat_agent::{MediatorConfig, MediatorMode, ToolCallMediator};
use mcpchat_core::error::format_error_with_suggestion;
use mcpchat_core::{Config, Role};
use mcpchat_providers::{OpenAIProvider, Provider};

use super::with_registry;
use crate::AppContext;

/// Result of a slash command.
enum CommandResult {
    Continue,
    Exit,
}

pub async fn run(ctx: &AppContext, mode: MediatorMode) -> anyhow::Result<()> {
    let provider = match OpenAIProvider::from_config(&ctx.config.llm) {
        Ok(provider) => Arc::new(provider) as Arc<dyn Provider>,
        Err(e) => {
            let e = mcpchat_core::Error::from(e);
            anyhow::bail!(format_error_with_suggestion(&e));
        }
    };

    with_registry(ctx, |registry| async move {
        let mut mediator = ToolCallMediator::builder()
            .provider(provider)
            .host(registry)
            .mode(mode)
            .config(MediatorConfig::from_llm(&ctx.config.llm))
            .build()?;
        mediator.prime().await;

        repl(&mut mediator).await
    })
    .await
}

async fn repl(mediator: &mut ToolCallMediator) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
    }

    println!("mcpchat ({:?} mode). Type /help for commands.", mediator.mode());

    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                if line.starts_with('/') {
                    match handle_command(line, mediator).await {
                        CommandResult::Continue => continue,
                        CommandResult::Exit => break,
                    }
                }

                match mediator.mode() {
                    MediatorMode::Structured => match mediator.send_message(line).await {
                        Some(answer) => println!("{}\n", answer),
                        None => eprintln!("Error: no reply from the LLM (run with --verbose for details)\n"),
                    },
                    MediatorMode::Streaming => {
                        let stream = mediator.send_message_stream(line);
                        pin_mut!(stream);
                        while let Some(fragment) = stream.next().await {
                            print!("{}", fragment);
                            io::stdout().flush()?;
                        }
                        println!("\n");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = editor.save_history(&history_path);

    Ok(())
}

async fn handle_command(line: &str, mediator: &mut ToolCallMediator) -> CommandResult {
    match line {
        "/quit" | "/exit" => CommandResult::Exit,
        "/clear" => {
            mediator.clear_history();
            mediator.prime().await;
            println!("Conversation cleared.");
            CommandResult::Continue
        }
        "/history" => {
            for message in mediator.history().messages() {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let first_line = message.content.lines().next().unwrap_or("");
                println!("[{}] {}", role, first_line);
            }
            CommandResult::Continue
        }
        "/help" => {
            println!("/clear    start a new conversation");
            println!("/history  show the conversation");
            println!("/quit     leave");
            CommandResult::Continue
        }
        other => {
            eprintln!("Unknown command: {}", other);
            CommandResult::Continue
        }
    }
}

fn history_path() -> PathBuf {
    Config::config_dir().join("history.txt")
}
