//! ciq - Command-line interface for Conversion Flux
//!
//! Commands:
//! - replay: Drive a tracker from a recorded signal trace and print what it sent
//! - validate: Check event envelopes against the send-time rules
//! - doctor: Diagnose configuration and API key resolution

use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use conversion_flux::delivery::{is_iso_timestamp, validate_envelope};
use conversion_flux::trace::{parse_trace, replay};
use conversion_flux::{
    ApiKeySources, Dispatch, Event, TrackerConfig, TrackerError, FLUX_VERSION, PRODUCER_NAME,
};

/// ciq - Checkout funnel and form lifecycle instrumentation engine
#[derive(Parser)]
#[command(name = "ciq")]
#[command(author = "ConversionIQ")]
#[command(version = FLUX_VERSION)]
#[command(about = "Replay page signals and inspect collector events", long_about = None)]
struct Cli {
    /// Log engine decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an NDJSON signal trace and print the delivered events
    Replay {
        /// Trace file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Tracker config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// API key, overriding the config file
        #[arg(long)]
        api_key: Option<String>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate event envelopes
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and API key resolution
    Doctor {
        /// Tracker config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// API key, overriding the config file
        #[arg(long)]
        api_key: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), CiqCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            config,
            api_key,
            output_format,
        } => cmd_replay(&input, &output, config.as_deref(), api_key, output_format),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor {
            config,
            api_key,
            json,
        } => cmd_doctor(config.as_deref(), api_key, json),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    api_key: Option<String>,
    output_format: OutputFormat,
) -> Result<(), CiqCliError> {
    let config = load_config(config)?.with_key_sources(&key_sources(api_key));
    let records = parse_trace(&read_input(input)?)?;
    if records.is_empty() {
        return Err(CiqCliError::EmptyTrace);
    }

    let dispatched = replay(config, &records)?;
    let events = dispatched
        .iter()
        .map(|dispatch| serde_json::from_str::<Event>(dispatch.body()))
        .collect::<Result<Vec<_>, _>>()?;

    let beacons = dispatched
        .iter()
        .filter(|d| matches!(d, Dispatch::Beacon { .. }))
        .count();
    tracing::debug!(events = events.len(), beacons, "replay finished");

    let output_data = format_output(&events, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), CiqCliError> {
    let input_data = read_input(input)?;

    let values: Vec<serde_json::Value> = match input_format {
        InputFormat::Ndjson => input_data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?,
        InputFormat::Json => serde_json::from_str(&input_data)?,
    };

    let total_events = values.len();
    let mut errors: Vec<ValidationErrorDetail> = Vec::new();
    let mut warnings: Vec<ValidationErrorDetail> = Vec::new();

    for (index, value) in values.into_iter().enumerate() {
        let event: Event = match serde_json::from_value(value) {
            Ok(event) => event,
            Err(e) => {
                errors.push(ValidationErrorDetail {
                    index,
                    event_id: None,
                    error: e.to_string(),
                });
                continue;
            }
        };
        let event_id = Some(event.event_id.clone()).filter(|id| !id.is_empty());

        if let Err(e) = validate_envelope(&event) {
            errors.push(ValidationErrorDetail {
                index,
                event_id,
                error: e.to_string(),
            });
        } else if !event.occurred_at.as_deref().is_some_and(is_iso_timestamp) {
            warnings.push(ValidationErrorDetail {
                index,
                event_id,
                error: "occurredAt missing or malformed; it will be replaced at send time"
                    .to_string(),
            });
        }
    }

    let report = ValidationReport {
        total_events,
        valid_events: total_events - errors.len(),
        invalid_events: errors.len(),
        errors,
        warnings,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event {} (index {}): {}",
                    err.event_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
        if !report.warnings.is_empty() {
            println!("\nWarnings:");
            for warning in &report.warnings {
                println!(
                    "  - Event {} (index {}): {}",
                    warning.event_id.as_deref().unwrap_or("unknown"),
                    warning.index,
                    warning.error
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(CiqCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, api_key: Option<String>, json: bool) -> Result<(), CiqCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("conversion-flux {}", FLUX_VERSION),
    });

    let loaded = match config {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: "Config file does not exist".to_string(),
            });
            None
        }
        Some(path) => match load_config(Some(path)) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Config valid (endpoint {})", config.endpoint),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: CliError::from(e).message,
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "No config file given; using defaults".to_string(),
            });
            Some(TrackerConfig::default())
        }
    };

    if let Some(config) = loaded {
        let config = config.with_key_sources(&key_sources(api_key));
        let key_check = match config.resolved_api_key() {
            Some(_) => DoctorCheck {
                name: "api_key".to_string(),
                status: CheckStatus::Ok,
                message: "API key resolved; tracking enabled".to_string(),
            },
            None => DoctorCheck {
                name: "api_key".to_string(),
                status: CheckStatus::Error,
                message: "No API key in config, --api-key, CIQ_API_KEY or WPCM_API_KEY; tracking disabled"
                    .to_string(),
            },
        };
        checks.push(key_check);

        if config.site_domain.is_empty() {
            checks.push(DoctorCheck {
                name: "site_domain".to_string(),
                status: CheckStatus::Warning,
                message: "site_domain is empty; site headers will be blank".to_string(),
            });
        }
    }

    // Check stdin is available (for piping traces)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (trace replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("ciq Doctor Report");
        println!("=================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CiqCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, CiqCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig, CiqCliError> {
    match path {
        Some(path) => Ok(TrackerConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(TrackerConfig::default()),
    }
}

fn key_sources(api_key: Option<String>) -> ApiKeySources {
    ApiKeySources {
        script_attribute: api_key,
        global: env::var("CIQ_API_KEY").ok(),
        legacy_global: env::var("WPCM_API_KEY").ok(),
        ..ApiKeySources::default()
    }
}

fn format_output(events: &[Event], format: &OutputFormat) -> Result<String, CiqCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for event in events {
                lines.push(serde_json::to_string(event)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(events)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(events)?),
    }
}

// Error types

#[derive(Debug)]
enum CiqCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    EmptyTrace,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for CiqCliError {
    fn from(e: io::Error) -> Self {
        CiqCliError::Io(e)
    }
}

impl From<TrackerError> for CiqCliError {
    fn from(e: TrackerError) -> Self {
        CiqCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for CiqCliError {
    fn from(e: serde_json::Error) -> Self {
        CiqCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CiqCliError> for CliError {
    fn from(e: CiqCliError) -> Self {
        match e {
            CiqCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CiqCliError::Tracker(TrackerError::MissingApiKey) => CliError {
                code: "MISSING_API_KEY".to_string(),
                message: TrackerError::MissingApiKey.to_string(),
                hint: Some("Pass --api-key or set CIQ_API_KEY".to_string()),
            },
            CiqCliError::Tracker(e) => CliError {
                code: "TRACKER_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'ciq doctor' for details".to_string()),
            },
            CiqCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CiqCliError::EmptyTrace => CliError {
                code: "EMPTY_TRACE".to_string(),
                message: "No records found in trace".to_string(),
                hint: Some("Ensure the trace file is not empty".to_string()),
            },
            CiqCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            CiqCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
    warnings: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    event_id: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
