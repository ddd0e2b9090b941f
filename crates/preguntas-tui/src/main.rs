use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use preguntas_core::{
    AnswerService, Config, ConversationStore, FileStorage, HttpAnswerClient, MemoryStorage,
    QueryOrchestrator, Rejected, Settled, Storage,
};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod history;
mod tui;
mod ui;

use app::{App, Orchestrator};

#[derive(Parser)]
#[command(name = "preguntas")]
#[command(about = "Ask questions of an LLM answer service and keep the conversation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Base URL of the answer service (default http://localhost:8000/api)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory holding conversation history and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep history in memory only; nothing is read from or written to disk
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question, print the answer and record it in history
    Ask {
        /// Your question
        question: String,
    },
    /// Print the stored conversation history
    History,
    /// Delete all stored conversation history
    Clear,
    /// Check that the answer service is up
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {}", e);
        Config::new()
    });
    if let Some(url) = cli.api_url.clone() {
        config.api_url = Some(url);
    }
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = Some(dir);
    }
    let data_dir = resolve_data_dir(&config, cli.ephemeral);

    match cli.command {
        None => {
            let log_warning = init_file_logging(data_dir.as_deref());
            let orchestrator = build_orchestrator(&config, data_dir.as_deref())?;
            let mut app = App::new(orchestrator, config.api_url());
            app.status = log_warning;
            run_tui(app).await
        }
        Some(command) => {
            init_stderr_logging();
            let mut orchestrator = build_orchestrator(&config, data_dir.as_deref())?;
            match command {
                Commands::Ask { question } => ask(&mut orchestrator, &question).await,
                Commands::History => {
                    print_history(&orchestrator);
                    Ok(())
                }
                Commands::Clear => {
                    let count = orchestrator.exchanges().len();
                    if let Some(e) = orchestrator.clear().warning() {
                        anyhow::bail!("could not clear history: {}", e);
                    }
                    println!("Cleared {} exchanges", count);
                    Ok(())
                }
                Commands::Health => health(orchestrator.service()).await,
            }
        }
    }
}

/// Where history and logs live, or `None` to keep everything in memory.
fn resolve_data_dir(config: &Config, ephemeral: bool) -> Option<PathBuf> {
    if ephemeral {
        return None;
    }
    match config.data_dir() {
        Ok(dir) => Some(dir),
        Err(e) => {
            eprintln!("History will not be saved: {}", e);
            None
        }
    }
}

fn build_orchestrator(config: &Config, data_dir: Option<&Path>) -> Result<Orchestrator> {
    let storage: Box<dyn Storage> = match data_dir {
        Some(dir) => Box::new(FileStorage::new(dir)),
        None => Box::new(MemoryStorage::new()),
    };
    let client = HttpAnswerClient::with_timeout(config.api_url(), config.request_timeout())
        .context("failed to build HTTP client")?;

    tracing::info!(api_url = config.api_url(), data_dir = ?data_dir, "starting");
    Ok(QueryOrchestrator::new(ConversationStore::open(storage), Arc::new(client)))
}

/// The TUI owns the terminal, so logs go to a file in the data directory.
/// Without a usable directory they are discarded; the returned message says
/// why, for the status line.
fn init_file_logging(data_dir: Option<&Path>) -> Option<String> {
    let (writer, warning) = match data_dir.map(open_log_file) {
        Some(Ok(file)) => (BoxMakeWriter::new(Mutex::new(file)), None),
        Some(Err(e)) => (
            BoxMakeWriter::new(io::sink),
            Some(format!("Logging disabled: {:#}", e)),
        ),
        None => (BoxMakeWriter::new(io::sink), None),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    warning
}

fn open_log_file(data_dir: &Path) -> Result<File> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let log_path = data_dir.join("preguntas.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_tui(mut app: App) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

async fn ask(orchestrator: &mut Orchestrator, question: &str) -> Result<()> {
    match orchestrator.submit(question).await {
        Ok(Settled::Answered(persistence)) => {
            if let Some(answer) = orchestrator.exchanges().last() {
                println!("{}", answer.response);
            }
            if let Some(e) = persistence.warning() {
                eprintln!("warning: answer not saved to history: {}", e);
            }
            Ok(())
        }
        Ok(Settled::Failed(message)) => anyhow::bail!(message),
        Err(Rejected::EmptyQuestion) => anyhow::bail!("question is empty"),
        Err(Rejected::AlreadyPending) => anyhow::bail!("another question is in flight"),
    }
}

fn print_history(orchestrator: &Orchestrator) {
    let exchanges = orchestrator.exchanges();
    if exchanges.is_empty() {
        println!("No conversation history");
        return;
    }
    for exchange in exchanges {
        let when = exchange.timestamp.with_timezone(&chrono::Local);
        println!("[{}] You: {}", when.format("%Y-%m-%d %H:%M"), exchange.query);
        println!("AI: {}", exchange.response);
        println!();
    }
}

async fn health(service: Arc<dyn AnswerService>) -> Result<()> {
    let status = service
        .health()
        .await
        .map_err(|e| anyhow::anyhow!("API health check failed: {}", e))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
