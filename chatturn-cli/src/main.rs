//! chatturn CLI - interactive streaming chat in the terminal

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chatturn_core::config::ChatTurnConfig;
use chatturn_core::conversation::TurnProcessor;
use chatturn_core::llm::MessageRole;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "chatturn")]
#[command(about = "Chat with a streaming LLM, keeping context between turns", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, layered over chatturn.toml and under CHATTURN_* env vars
    #[arg(short, long, env = "CHATTURN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// System message sent before the conversation
    #[arg(short, long)]
    system: Option<String>,

    /// Seconds of inactivity after which history is discarded
    #[arg(long)]
    idle_timeout: Option<f64>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,
}

enum Command {
    Chat(String),
    Reset,
    History,
    Quit,
    Empty,
}

fn parse_command(line: &str) -> Command {
    match line.trim() {
        "" => Command::Empty,
        "/reset" => Command::Reset,
        "/history" => Command::History,
        "/quit" | "/exit" => Command::Quit,
        text => Command::Chat(text.to_string()),
    }
}

fn load_config(cli: &Cli) -> Result<ChatTurnConfig> {
    let mut config = ChatTurnConfig::load_with(cli.config.as_deref())?;

    if let Some(system) = &cli.system {
        config.processor.system_message = Some(system.clone());
    }
    if let Some(secs) = cli.idle_timeout {
        config.processor = config.processor.with_idle_timeout_secs(secs)?;
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }

    Ok(config)
}

async fn run_turn(processor: &mut TurnProcessor, text: String) -> Result<()> {
    let mut turn = processor.chat(text).await?;
    let mut stdout = std::io::stdout();

    while let Some(fragment) = turn.next().await {
        let fragment = fragment?;
        write!(stdout, "{}", fragment)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    Ok(())
}

fn print_history(processor: &TurnProcessor) {
    println!("{} message(s) in history", processor.history_len());
    for message in processor.histories() {
        let speaker = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "you",
            MessageRole::Assistant => "assistant",
        };
        println!("  [{}] {}", speaker, message.content);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut processor =
        TurnProcessor::from_config(&config).context("Failed to start turn processor")?;

    tracing::info!(
        model = %config.llm.model,
        idle_timeout = ?processor.idle_timeout(),
        "Ready; type /reset, /history or /quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Reset => {
                processor.reset_histories();
                println!("History cleared.");
            }
            Command::History => print_history(&processor),
            Command::Chat(text) => {
                if let Err(e) = run_turn(&mut processor, text).await {
                    println!();
                    tracing::error!("Turn failed: {:#}", e);
                }
            }
        }
    }

    Ok(())
}
