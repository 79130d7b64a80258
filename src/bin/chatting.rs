//! Interactive terminal chat with DeepSeek models.
//!
//! # Usage
//!
//! ```bash
//! # Reads DEEPSEEK_API_KEY (and optionally API_BASE, DEFAULT_MODEL) from the
//! # environment or a .env file
//! chatting
//!
//! # Start with the reasoning model and keep only the last 10 exchanges
//! chatting --model deepseek-reasoner --max-context-turns 10
//!
//! # Disable colors (useful for piping output)
//! chatting --no-color
//! ```
//!
//! Type `/help` while chatting for the list of commands.  Set `CHATTING_LOG`
//! (e.g. `CHATTING_LOG=debug`) to see logs on stderr.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use chatting::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, Dispatcher, Flow, SessionConfig,
    SystemClipboard, parse_command,
};
use chatting::{DeepSeek, Renderer, TerminalRenderer};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CHATTING_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main entry point for the chatting application.
#[tokio::main]
async fn main() -> ExitCode {
    // Variables already in the environment win over .env.
    dotenvy::dotenv().ok();
    init_tracing();

    let (args, free) = ChatArgs::from_command_line_relaxed("chatting [OPTIONS]");
    if !free.is_empty() {
        eprintln!("chatting: unexpected arguments: {}", free.join(" "));
        return ExitCode::from(2);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("chatting: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let env = SessionConfig::from_env()?;
    tracing::debug!(?env, "loaded environment");
    let config = ChatConfig::from_args(args, &env)?;
    let use_color = config.use_color;

    let client = DeepSeek::with_options(env.api_key.clone(), Some(env.api_base.as_str()), None)?;
    let mut session = ChatSession::new(client, config);

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut renderer = TerminalRenderer::with_color(use_color).with_interrupt(interrupted.clone());
    let mut clipboard = SystemClipboard::new();
    let mut rl = DefaultEditor::new()?;

    println!("DeepSeek chat (model: {})", session.model());
    println!("Type /help for commands, /quit to exit; Ctrl+C stops a reply.\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let (line, command) = match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                let command = parse_command(&line);
                (line, command)
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // End of input takes the same path as /quit.
                println!();
                (String::new(), Some(ChatCommand::Quit))
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        };

        let message = match command {
            None => line,
            Some(command) => {
                let mut dispatcher = Dispatcher::new(&mut rl, &mut clipboard);
                match dispatcher.dispatch(command, &mut session, &mut renderer) {
                    Ok(Flow::Continue) => continue,
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Send(text)) => text,
                    Err(err) => {
                        renderer.print_error(&err.to_string());
                        continue;
                    }
                }
            }
        };

        println!("Assistant:");
        if let Err(err) = session.send_streaming(&message, &mut renderer).await {
            renderer.print_error(&err.to_string());
        }
        println!();
    }

    Ok(())
}
