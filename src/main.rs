//! CLI entry point for cbc-devices: Carbon Black Cloud device housekeeping.
//!
//! Loads settings and credentials, then dispatches to one subcommand:
//! `devices`, `inactive`, `deregister`, `bulk-deregister` or `alerts`.
//! Library functions return `CbcError`; this file alone decides the exit
//! status.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (credentials, API error, network, IO)
//! - 2: argument validation error (clap, or a date/threshold rejected later)

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cbc_devices::alerts::{ALERT_HEADER, AlertWindow, search_alerts};
use cbc_devices::batch::deregister_in_batches;
use cbc_devices::client::CbcClient;
use cbc_devices::config::Settings;
use cbc_devices::credentials::{Credentials, DEFAULT_CREDENTIALS_FILE};
use cbc_devices::devices::{export_devices, export_row_count, parse_export_keyword};
use cbc_devices::error::{CbcError, Result, describe_status};
use cbc_devices::inactivity::{
    Cutoff, LOW_THRESHOLD_DAYS, find_inactive, parse_threshold, write_inactive_report,
};
use cbc_devices::removal::{OutcomeTally, RemovalConfig, deregister_each};
use cbc_devices::report::{
    BULK_HEADER, CsvWriter, DEREGISTER_HEADER, INACTIVE_HEADER, read_inactive_list,
};

const INACTIVE_REPORT: &str = "inactive-devices.csv";
const DEREGISTER_REPORT: &str = "inactive-devices-result.csv";
const BULK_REPORT: &str = "bulkderegister-result.csv";
const ALERT_REPORT: &str = "alert_list.csv";

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Credential file holding `<token>,<org_key>,<org_id>`.
    #[arg(long, env = "CBC_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,

    /// Optional TOML settings file (page size, batch size, waits, base URL).
    #[arg(long, env = "CBC_CONFIG")]
    config: Option<PathBuf>,

    /// API base URL, overriding the settings file.
    #[arg(long, env = "CBC_BASE_URL")]
    base_url: Option<String>,

    /// Directory reports are written to.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export the device inventory for a status (default: all devices).
    Devices {
        /// ALL | PENDING | REGISTERED | UNINSTALLED | DEREGISTERED | ACTIVE |
        /// INACTIVE | ERROR | BYPASS_ON | BYPASS | QUARANTINE |
        /// SENSOR_OUTOFDATE | DELETED | LIVE (case-insensitive).
        #[arg(default_value = "all", value_parser = status_arg)]
        status: String,
    },

    /// List registered devices that have not checked in for DAYS days.
    Inactive {
        /// Inactivity threshold in days (default from settings, 90).
        #[arg(allow_hyphen_values = true, value_parser = threshold_arg)]
        days: Option<u32>,
    },

    /// Remove the devices of an inactive report one by one, skipping any
    /// that were deleted or checked in since the report was made.
    Deregister {
        #[arg(long, default_value = INACTIVE_REPORT)]
        input: PathBuf,
        /// Result report (default: inactive-devices-result.csv in --output-dir).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Remove the devices of an inactive report in batches, without
    /// per-device checks.
    BulkDeregister {
        #[arg(long, default_value = INACTIVE_REPORT)]
        input: PathBuf,
        /// Result report (default: bulkderegister-result.csv in --output-dir).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Devices per batch (default from settings, 50).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Export alerts with policy applied. No dates: previous calendar month.
    /// START only: 30 days from START. START END: inclusive range.
    Alerts {
        /// Start date, YYYY-MM-DD.
        start: Option<String>,
        /// End date, YYYY-MM-DD.
        end: Option<String>,
    },
}

fn status_arg(s: &str) -> std::result::Result<String, String> {
    parse_export_keyword(s).map_err(|e| e.to_string())
}

fn threshold_arg(s: &str) -> std::result::Result<u32, String> {
    parse_threshold(s).map_err(|e| e.to_string())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cbc_devices=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(url) = &cli.base_url {
        settings.base_url = if url.ends_with('/') {
            url.clone()
        } else {
            format!("{url}/")
        };
    }
    if let Command::BulkDeregister {
        batch_size: Some(n),
        ..
    } = &cli.command
    {
        settings.batch_size = *n;
    }
    settings.validate()?;
    Ok(settings)
}

fn connect(cli: &Cli, settings: &Settings) -> Result<CbcClient> {
    let credentials = Credentials::load(&cli.credentials)?;
    tracing::debug!(org_key = %credentials.org_key, org_id = %credentials.org_id, "credentials loaded");
    CbcClient::with_timeout(credentials, &settings.base_url, settings.request_timeout())
}

fn create_report(path: &Path, header: &[&str]) -> Result<CsvWriter<BufWriter<File>>> {
    CsvWriter::new(BufWriter::new(File::create(path)?), header)
}

fn read_entries(path: &Path) -> Result<Vec<cbc_devices::report::InactiveEntry>> {
    read_inactive_list(BufReader::new(File::open(path)?))
}

fn print_tally(tally: &OutcomeTally) {
    for (outcome, count) in tally.iter() {
        println!("  {outcome}: {count}");
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let today: NaiveDate = Local::now().date_naive();
    let removal_config = RemovalConfig::new(settings.settle(), settings.batch_pause());

    match &cli.command {
        Command::Devices { status } => {
            let client = connect(&cli, &settings)?;
            println!("Downloading {status} devices from CB");
            let csv = export_devices(&client, status).await?;

            let path = cli.output_dir.join(format!("{status}-devices.csv"));
            std::fs::write(&path, &csv)?;
            let devices = export_row_count(&csv);
            println!("{devices} devices written to {}", path.display());
        }

        Command::Inactive { days } => {
            let days = days.unwrap_or(settings.inactive_threshold_days);
            if days < LOW_THRESHOLD_DAYS {
                tracing::warn!(
                    days,
                    "threshold is below {LOW_THRESHOLD_DAYS} days; the list may contain endpoints \
                     that are only switched off or in storage"
                );
            }
            let cutoff = Cutoff::from_threshold(today, days)?;
            let client = connect(&cli, &settings)?;
            println!(
                "Today: {today}, inactive threshold: {days} days, cutoff date: {}",
                cutoff.date()
            );

            let found = find_inactive(&client, &cutoff, settings.page_size).await?;
            let path = cli.output_dir.join(INACTIVE_REPORT);
            let mut report = create_report(&path, INACTIVE_HEADER)?;
            let written = write_inactive_report(&found.inactive, &cutoff, &mut report)?;
            report.finish()?;

            println!("Found {written} inactive devices, written to {}", path.display());
            if !found.unknown.is_empty() {
                println!(
                    "{} devices have no last contact time and were not listed",
                    found.unknown.len()
                );
            }
        }

        Command::Deregister { input, output } => {
            let entries = read_entries(input)?;
            let client = connect(&cli, &settings)?;
            let path = output
                .clone()
                .unwrap_or_else(|| cli.output_dir.join(DEREGISTER_REPORT));
            tracing::warn!(devices = entries.len(), "uninstalling and deleting sensors; this cannot be undone");

            let mut report = create_report(&path, DEREGISTER_HEADER)?;
            let tally = deregister_each(&client, &entries, &removal_config, &mut report).await?;
            report.finish()?;

            println!("Processed {} devices, results in {}", tally.total(), path.display());
            print_tally(&tally);
        }

        Command::BulkDeregister { input, output, .. } => {
            let entries = read_entries(input)?;
            let client = connect(&cli, &settings)?;
            let path = output
                .clone()
                .unwrap_or_else(|| cli.output_dir.join(BULK_REPORT));
            tracing::warn!(
                devices = entries.len(),
                batch_size = settings.batch_size,
                "bulk uninstalling and deleting sensors without per-device checks; this cannot be undone"
            );

            let mut report = create_report(&path, BULK_HEADER)?;
            let summaries = deregister_in_batches(
                &client,
                &entries,
                settings.batch_size,
                &removal_config,
                &mut report,
            )
            .await?;
            report.finish()?;

            let mut tally = OutcomeTally::default();
            for s in &summaries {
                println!("Batch {} ({} devices): {}", s.batch, s.size, s.outcome);
                tally.record(s.outcome, s.size);
            }
            println!("Processed {} devices, results in {}", tally.total(), path.display());
            print_tally(&tally);
        }

        Command::Alerts { start, end } => {
            let window = AlertWindow::from_args(today, start.as_deref(), end.as_deref())?;
            let client = connect(&cli, &settings)?;
            println!("Searching alerts from {} to {}", window.start, window.end);

            let alerts = search_alerts(&client, &window, settings.page_size).await?;
            let path = cli.output_dir.join(ALERT_REPORT);
            let mut report = create_report(&path, ALERT_HEADER)?;
            for alert in &alerts {
                tracing::debug!(
                    device = alert.device_name.as_deref().unwrap_or(""),
                    date = alert.create_date(),
                    time = alert.create_time_utc(),
                    "alert"
                );
                report.write_row(&alert.row())?;
            }
            report.finish()?;
            println!("Written {} alerts to {}", alerts.len(), path.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(status) = e.status() {
                eprintln!("{}", describe_status(status));
            }
            match e {
                CbcError::InvalidArgument(_) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
