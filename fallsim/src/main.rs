#![forbid(unsafe_code)]

use anyhow::Context;
use clap::{Parser, ValueEnum};
use fallsim::{ControlCommand, DeviceStatus, Simulator};
use fallwatch_bus::{BusClient, TopicCodec};
use fallwatch_lib::config::ConfigLoader;
use fallwatch_lib::{input, logging};
use fallwatch_lib::shutdown::{self, ShutdownSignal};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

/// FallWatch device simulator
#[derive(Parser)]
#[command(name = "fallsim")]
#[command(about = "Publish simulated wearable telemetry for a set of patients")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// Number of simulated devices
    #[arg(short = 'n', long)]
    devices: Option<u32>,

    /// Enable every device at startup
    #[arg(long)]
    enable_all: bool,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Status output format
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

    let mut loader = ConfigLoader::new("fallsim");
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().context("loading configuration")?;
    if let Some(host) = cli.host {
        config.broker.host = host;
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(devices) = cli.devices {
        config.simulator.devices = devices;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    logging::init(&config.logging);

    let (trigger, signal) = shutdown::channel();
    let codec = TopicCodec::new(config.broker.topic_prefix.clone());
    let (client, _inbound) = BusClient::connect_mqtt(&config.broker, "sim", codec, signal.clone())
        .await
        .context("connecting to broker")?;

    let simulator = Simulator::start(&client.publisher(), &config.simulator, &signal);
    if cli.enable_all {
        for device in simulator.devices() {
            device.enable();
        }
    }
    print_status(&simulator.status(), cli.format);

    read_control_commands(&simulator, cli.format, signal).await;

    info!("Shutting down");
    trigger.trigger();
    simulator.join().await;
    if let Err(e) = client.disconnect().await {
        warn!(error = %e, "Bus disconnect failed");
    }
    Ok(())
}

/// Read device commands from stdin until `quit`, Ctrl-C or shutdown.
async fn read_control_commands(simulator: &Simulator, format: OutputFormat, mut shutdown: ShutdownSignal) {
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
                Some(Ok(line)) => match line.parse::<ControlCommand>() {
                    Ok(ControlCommand::Quit) => break,
                    Ok(ControlCommand::Status) => print_status(&simulator.status(), format),
                    Ok(ControlCommand::Device { number, action }) => {
                        if let Err(e) = simulator.apply(number, action) {
                            eprintln!("{e}");
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
                None => {
                    info!("stdin closed; running until interrupted");
                    stdin_open = false;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to read control input");
                    stdin_open = false;
                }
            }
        }
    }
}

#[allow(clippy::print_stdout)]
fn print_status(devices: &[DeviceStatus], format: OutputFormat) {
    match format {
        OutputFormat::Human => {
            for device in devices {
                println!(
                    "Device {:<3} patient {:<6} {:<8} Lat: {:<10} Lon: {:<10} {}",
                    device.device,
                    device.patient_id.to_string(),
                    if device.enabled { "enabled" } else { "disabled" },
                    device.latitude.as_deref().unwrap_or("-"),
                    device.longitude.as_deref().unwrap_or("-"),
                    device.heartrate_display,
                );
            }
        }
        OutputFormat::Json => match serde_json::to_string(devices) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "Failed to serialize device status"),
        },
    }
}
