#![forbid(unsafe_code)]

use anyhow::Context;
use clap::{Parser, ValueEnum};
use fallwatch_bus::BusClient;
use fallwatch_console::{Console, ConsoleView, OperatorCommand, console_codec};
use fallwatch_lib::config::ConfigLoader;
use fallwatch_lib::shutdown::{self, ShutdownSignal};
use fallwatch_lib::storage::DatabaseManager;
use fallwatch_lib::{input, logging};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

/// FallWatch operator console
#[derive(Parser)]
#[command(name = "fallwatch-console")]
#[command(about = "Ingest patient telemetry, raise fall alerts and track patient state")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Patient database path
    #[arg(short, long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// Decode the complete patient id from topics instead of the first character
    #[arg(long)]
    full_id_decode: bool,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// View output format
    #[arg(short = 'f', long, value_enum, default_value = "human")]
    format: OutputFormat,
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new("fallwatch-console");
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().context("loading configuration")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    if let Some(host) = cli.host {
        config.broker.host = host;
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if cli.full_id_decode {
        config.console.full_id_decode = true;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    logging::init(&config.logging);

    let db = DatabaseManager::new(&config.database.path).with_context(|| {
        format!("opening patient database {}", config.database.path.display())
    })?;
    let db = Arc::new(db);

    let (trigger, signal) = shutdown::channel();
    let codec = console_codec(&config.broker, &config.console);
    let (client, inbound) =
        BusClient::connect_mqtt(&config.broker, "console", codec, signal.clone())
            .await
            .context("connecting to broker")?;

    let console = Console::start(client, inbound, db, &config.console, &signal);
    let renderer = tokio::spawn(render_views(console.view(), cli.format, signal.clone()));

    read_operator_commands(&console, cli.format, signal).await;

    info!("Shutting down");
    trigger.trigger();
    console.join().await;
    if let Err(e) = renderer.await {
        warn!(error = %e, "Renderer task failed");
    }
    Ok(())
}

/// Read operator commands from stdin until `quit`, Ctrl-C or shutdown.
async fn read_operator_commands(console: &Console, format: OutputFormat, mut shutdown: ShutdownSignal) {
    let mut lines = input::stdin_lines(16);
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            () = shutdown.wait() => break,
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            line = lines.recv(), if stdin_open => match line {
                Some(Ok(line)) if line.trim().is_empty() => {}
                Some(Ok(line)) => match line.parse::<OperatorCommand>() {
                    Ok(OperatorCommand::Quit) => break,
                    Ok(OperatorCommand::List) => print_view(&console.view().borrow(), format),
                    Ok(command) => {
                        if !console.send(command) {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
                None => {
                    info!("stdin closed; running until interrupted");
                    stdin_open = false;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to read operator input");
                    stdin_open = false;
                }
            }
        }
    }
}

async fn render_views(
    mut view: watch::Receiver<ConsoleView>,
    format: OutputFormat,
    mut shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            () = shutdown.wait() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                print_view(&current, format);
            }
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_view(view: &ConsoleView, format: OutputFormat) {
    match format {
        OutputFormat::Human => println!("{}", view.render()),
        OutputFormat::Json => match serde_json::to_string(view) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "Failed to serialize view"),
        },
    }
}
