//! Interactive chat with OpenAI, Anthropic and xAI models from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Chat with the default assistant
//! colloquy
//!
//! # Chat with the `dev` assistant on a specific model
//! colloquy --model claude-sonnet-4-0 dev
//!
//! # Print one response and exit
//! colloquy --prompt "list files by size" bash
//! git diff | colloquy --prompt - --no-stream
//!
//! # Ask for a shell command, review it in $EDITOR, then run it
//! colloquy --execute "find large files under /var" bash
//! ```
//!
//! While chatting, `:q` quits, `:c` clears the conversation, `:r` re-runs the
//! last message and `:h` shows help.  Append `--temperature 0.2` (or any other
//! override) to a message to change parameters for that message only.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use arrrg::CommandLine;

use colloquy::chat::config::history_path;
use colloquy::chat::{
    AppConfig, ChatArgs, ChatListener, ChatSession, CompositeChatListener, Interrupt,
    LineEditorInput,
};
use colloquy::cost::PriceChatListener;
use colloquy::logging::{LoggingChatListener, init_logging};
use colloquy::oneshot::{execute, simple_response};
use colloquy::providers::registry_from_config;
use colloquy::render::TerminalListener;
use colloquy::{Assistant, init_assistant};

const USAGE: &str = "colloquy [OPTIONS] [ASSISTANT]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = ChatArgs::from_command_line_relaxed(USAGE);
    if free.len() > 1 {
        eprintln!("usage: {USAGE}");
        std::process::exit(1);
    }

    let config = AppConfig::load(args.config.as_deref().map(Path::new))?;
    let log_file = args.log_file.as_deref().or(config.log_file.as_deref());
    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    if let Some(path) = init_logging(log_file, log_level)? {
        tracing::info!(path = %path.display(), "logging to file");
    }

    let registry = Arc::new(registry_from_config(&config)?);
    let name = free
        .first()
        .cloned()
        .unwrap_or_else(|| config.default_assistant.clone());
    let assistant = init_assistant(&args.global_args(name)?, &config.assistants, registry)?;

    let interrupt = Interrupt::new();
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || interrupt.trigger())?;
    }

    let stream = config.stream && !args.no_stream;
    match (args.prompt.as_deref(), args.execute.as_deref()) {
        (Some(prompt), _) => run_prompt(&assistant, prompt, stream, &interrupt).await,
        (None, Some(prompt)) => run_execute(&assistant, prompt, &interrupt).await,
        (None, None) => {
            let use_color = config.use_color && !args.no_color;
            let show_price = config.show_price && !args.no_price;
            run_interactive(assistant, stream, use_color, show_price, interrupt).await
        }
    }
}

fn read_prompt(prompt: &str) -> std::io::Result<String> {
    if prompt != "-" {
        return Ok(prompt.to_string());
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

async fn run_prompt(
    assistant: &Assistant,
    prompt: &str,
    stream: bool,
    interrupt: &Interrupt,
) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = read_prompt(prompt)?;
    tracing::info!(config = ?assistant.config(), "starting one-shot prompt");
    let mut stdout = std::io::stdout();
    simple_response(assistant, &prompt, stream, interrupt, &mut stdout).await?;
    Ok(())
}

async fn run_execute(
    assistant: &Assistant,
    prompt: &str,
    interrupt: &Interrupt,
) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = read_prompt(prompt)?;
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    tracing::info!(
        config = ?assistant.config(),
        editor = %editor,
        shell = %shell,
        "starting execute"
    );
    match execute(assistant, &prompt, interrupt, &editor, &shell).await? {
        Some(status) => std::process::exit(status.code().unwrap_or(1)),
        None => {
            eprintln!("Cancelled.");
            Ok(())
        }
    }
}

async fn run_interactive(
    assistant: Assistant,
    stream: bool,
    use_color: bool,
    show_price: bool,
    interrupt: Interrupt,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = ?assistant.config(), "starting chat session");
    let mut listeners: Vec<Box<dyn ChatListener>> = vec![
        Box::new(TerminalListener::new(use_color)),
        Box::new(LoggingChatListener::new()),
    ];
    if show_price {
        listeners.push(Box::new(PriceChatListener::new(use_color)));
    }
    let mut session = ChatSession::new(assistant, Box::new(CompositeChatListener::new(listeners)))
        .with_streaming(stream)
        .with_interrupt(interrupt);
    let mut input = LineEditorInput::new(history_path())?;
    session.run(&mut input).await;
    Ok(())
}
