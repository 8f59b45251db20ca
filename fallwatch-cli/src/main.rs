#![forbid(unsafe_code)]

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fallwatch_lib::config::ConfigLoader;
use fallwatch_lib::logging;
use fallwatch_lib::models::{EmergencyContact, NewPatient, PatientRecord};
use fallwatch_lib::storage::{DatabaseManager, DatabaseStats};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

/// FallWatch datastore administration
#[derive(Parser)]
#[command(name = "fallwatch-cli")]
#[command(about = "Inspect and administer the FallWatch patient datastore")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Patient database path
    #[arg(short = 'd', long = "database", value_name = "PATH", global = true)]
    database: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered patients
    List,
    /// Show one patient record with allergies and contacts
    Show { id: u64 },
    /// Register a new patient
    AddPatient(PatientArgs),
    /// Attach an allergy to a patient
    AddAllergy { id: u64, name: String },
    /// Attach an emergency contact to a patient
    AddContact {
        id: u64,
        #[command(flatten)]
        contact: ContactArgs,
    },
    /// Print datastore statistics
    Stats,
}

#[derive(Args)]
struct PatientArgs {
    #[arg(long)]
    firstname: String,
    #[arg(long)]
    lastname: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    postcode: String,
}

#[derive(Args)]
struct ContactArgs {
    #[arg(long)]
    firstname: String,
    #[arg(long)]
    lastname: String,
    #[arg(long)]
    relationship: String,
    #[arg(long)]
    phone: String,
}

#[derive(Serialize)]
struct PatientSummary<'a> {
    id: u64,
    name: String,
    postcode: &'a str,
    heartrate: Option<u32>,
}

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new("fallwatch-cli");
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().context("loading configuration")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    logging::init(&config.logging);

    let db = DatabaseManager::new(&config.database.path).with_context(|| {
        format!("opening patient database {}", config.database.path.display())
    })?;

    match cli.command {
        Command::List => {
            let mut patients = Vec::new();
            for id in db.get_patient_ids()? {
                if let Some(record) = db.get_patient(id)? {
                    patients.push(record);
                }
            }
            print_patients(&patients, cli.format)?;
        }
        Command::Show { id } => {
            let Some(record) = db.get_patient(id)? else {
                bail!("patient {id} not found");
            };
            print_patient(&record, cli.format)?;
        }
        Command::AddPatient(args) => {
            let id = db.insert_patient(&NewPatient {
                firstname: args.firstname,
                lastname: args.lastname,
                address: args.address,
                postcode: args.postcode,
            })?;
            info!(patient_id = id, "Patient registered");
            print_created(id, cli.format)?;
        }
        Command::AddAllergy { id, name } => {
            db.add_allergy(id, &name)
                .with_context(|| format!("adding allergy to patient {id}"))?;
            info!(patient_id = id, allergy = %name, "Allergy added");
            print_created(id, cli.format)?;
        }
        Command::AddContact { id, contact } => {
            db.add_emergency_contact(
                id,
                &EmergencyContact {
                    firstname: contact.firstname,
                    lastname: contact.lastname,
                    relationship: contact.relationship,
                    phonenumber: contact.phone,
                },
            )
            .with_context(|| format!("adding emergency contact to patient {id}"))?;
            info!(patient_id = id, "Emergency contact added");
            print_created(id, cli.format)?;
        }
        Command::Stats => print_stats(&db.get_stats()?, cli.format)?,
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_patients(patients: &[PatientRecord], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let summaries: Vec<_> = patients
                .iter()
                .map(|record| PatientSummary {
                    id: record.id,
                    name: record.full_name(),
                    postcode: &record.postcode,
                    heartrate: record.state.heartrate,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        OutputFormat::Human => {
            if patients.is_empty() {
                println!("No patients registered");
            }
            for record in patients {
                println!("{:>4}  {:<30} {}", record.id, record.full_name(), record.postcode);
            }
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_patient(record: &PatientRecord, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Human => {
            let dash = || "-".to_owned();
            println!("Patient {}: {}", record.id, record.full_name());
            println!("Address: {}, {}", record.address, record.postcode);
            println!(
                "Heartrate: {} BPM",
                record.state.heartrate.map_or_else(dash, |bpm| bpm.to_string())
            );
            println!(
                "Latitude: {}",
                record.state.latitude.clone().unwrap_or_else(dash)
            );
            println!(
                "Longitude: {}",
                record.state.longitude.clone().unwrap_or_else(dash)
            );
            println!("Allergies:");
            for allergy in &record.allergies {
                println!("  {allergy}");
            }
            println!("Emergency contacts:");
            for contact in &record.emergency_contacts {
                println!("  {contact}");
            }
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_created(id: u64, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "id": id })),
        OutputFormat::Human => println!("Patient {id} updated"),
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_stats(stats: &DatabaseStats, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Human => {
            println!("FallWatch Datastore Statistics");
            println!("==============================");
            println!("Patients: {}", stats.patients);
            println!("Allergies: {}", stats.allergies);
            println!("Emergency contacts: {}", stats.emergency_contacts);
        }
    }
    Ok(())
}
