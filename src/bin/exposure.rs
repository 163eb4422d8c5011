//! Exposure CLI - Command-line interface for the school exposure engine
//!
//! Commands:
//! - run: Run the full pipeline over registries and hourly readings
//! - validate: Run only the pollutant validator and report drops
//! - weekly: Print weekly summaries for one pollutant and week
//! - config: Print the default configuration

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Deserialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use school_exposure::pipeline::{ExposurePipeline, PipelineOutput};
use school_exposure::types::{RawReading, School, SchoolExposureDaily, Station};
use school_exposure::{
    select_week, ComputeError, PipelineConfig, Pollutant, SchoolRegistry, StationRegistry,
    WeekSelector, WeeklySummarizer, ENGINE_VERSION,
};

/// Exit code for a completed run that QC rejected
const EXIT_QC_FAILED: u8 = 2;

/// Exposure - daily school air-pollution exposure with QC acceptance
#[derive(Parser)]
#[command(name = "exposure")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Compute coverage-gated school exposures from hourly station readings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline (exit code 2 when QC fails)
    Run {
        /// Station registry (JSON array)
        #[arg(long)]
        stations: PathBuf,

        /// School registry (JSON array)
        #[arg(long)]
        schools: PathBuf,

        /// Hourly readings (use - for stdin)
        #[arg(long)]
        readings: PathBuf,

        /// Pipeline configuration (JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,

        /// Readings format
        #[arg(long, default_value = "ndjson")]
        readings_format: InputFormat,
    },

    /// Validate hourly readings against the pollutant rules
    Validate {
        /// Hourly readings (use - for stdin)
        #[arg(long)]
        readings: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Readings format
        #[arg(long, default_value = "ndjson")]
        readings_format: InputFormat,

        /// Output validation summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print weekly summaries for one pollutant
    Weekly {
        /// Daily exposures (JSON array) or a saved run output
        #[arg(long)]
        exposures: PathBuf,

        /// Pollutant name (e.g. no2, pm10)
        #[arg(long, value_parser = parse_pollutant)]
        pollutant: Pollutant,

        /// ISO week ("latest" or YYYY-Www)
        #[arg(long, default_value = "latest")]
        week: String,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// JSON array of readings
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

/// Accepted shapes for the weekly command's input
#[derive(Deserialize)]
#[serde(untagged)]
enum ExposureInput {
    Records(Vec<SchoolExposureDaily>),
    RunOutput(Box<PipelineOutput>),
}

fn parse_pollutant(name: &str) -> Result<Pollutant, String> {
    Pollutant::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = Pollutant::ALL.iter().map(|p| p.as_str()).collect();
        format!("unknown pollutant {name:?} (expected one of {})", known.join(", "))
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, ExposureCliError> {
    match cli.command {
        Commands::Run {
            stations,
            schools,
            readings,
            config,
            output,
            output_format,
            readings_format,
        } => cmd_run(
            &stations,
            &schools,
            &readings,
            config.as_deref(),
            &output,
            output_format,
            readings_format,
        ),
        Commands::Validate {
            readings,
            config,
            readings_format,
            json,
        } => cmd_validate(&readings, config.as_deref(), readings_format, json),
        Commands::Weekly {
            exposures,
            pollutant,
            week,
        } => cmd_weekly(&exposures, pollutant, &week),
        Commands::Config => cmd_config(),
    }
}

fn cmd_run(
    stations_path: &Path,
    schools_path: &Path,
    readings_path: &Path,
    config_path: Option<&Path>,
    output: &Path,
    output_format: OutputFormat,
    readings_format: InputFormat,
) -> Result<ExitCode, ExposureCliError> {
    let pipeline = ExposurePipeline::new(load_config(config_path)?)?;

    let stations: Vec<Station> = serde_json::from_str(&read_input(stations_path)?)?;
    let schools: Vec<School> = serde_json::from_str(&read_input(schools_path)?)?;
    let readings = parse_readings(&read_input(readings_path)?, &readings_format)?;

    let stations = StationRegistry::new(stations);
    let schools = SchoolRegistry::new(schools);
    if schools.is_empty() {
        return Err(ExposureCliError::NoSchools);
    }

    let result = pipeline.run(&stations, &schools, &readings);

    let pretty = matches!(output_format, OutputFormat::JsonPretty);
    let mut output_data = result.to_json(pretty)?;
    output_data.push('\n');
    write_output(output, &output_data)?;

    if result.accepted() {
        info!("QC PASS");
        Ok(ExitCode::SUCCESS)
    } else {
        info!("QC FAIL: {}", result.qc.failed_checks.join(", "));
        Ok(ExitCode::from(EXIT_QC_FAILED))
    }
}

fn cmd_validate(
    readings_path: &Path,
    config_path: Option<&Path>,
    readings_format: InputFormat,
    json: bool,
) -> Result<ExitCode, ExposureCliError> {
    let pipeline = ExposurePipeline::new(load_config(config_path)?)?;
    let readings = parse_readings(&read_input(readings_path)?, &readings_format)?;
    let summary = pipeline.validator().validate(&readings).summary;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Input records:    {}", summary.input);
        println!("Kept:             {}", summary.kept);
        println!("Invalid retained: {}", summary.invalid_retained);
        println!("Dropped:          {}", summary.dropped_total());

        if !summary.dropped.is_empty() {
            println!("\nDrop reasons:");
            for (reason, count) in &summary.dropped {
                println!("  - {}: {}", reason, count);
            }
        }
        if !summary.per_pollutant.is_empty() {
            println!("\nKept per pollutant:");
            for (pollutant, count) in &summary.per_pollutant {
                println!("  - {}: {}", pollutant, count);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_weekly(
    exposures_path: &Path,
    pollutant: Pollutant,
    week: &str,
) -> Result<ExitCode, ExposureCliError> {
    let selector: WeekSelector = week.parse()?;

    let input: ExposureInput = serde_json::from_str(&read_input(exposures_path)?)?;
    let exposures = match input {
        ExposureInput::Records(records) => records,
        ExposureInput::RunOutput(output) => output.exposures,
    };

    let summaries = WeeklySummarizer::summarize(&exposures);
    let selected = select_week(&summaries, pollutant, selector)?;
    println!("{}", serde_json::to_string_pretty(&selected)?);

    Ok(ExitCode::SUCCESS)
}

fn cmd_config() -> Result<ExitCode, ExposureCliError> {
    println!("{}", PipelineConfig::default().to_json()?);
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ExposureCliError> {
    match path {
        Some(path) => Ok(PipelineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, ExposureCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), ExposureCliError> {
    if path.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn parse_readings(data: &str, format: &InputFormat) -> Result<Vec<RawReading>, ExposureCliError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_str(data)?),
        InputFormat::Ndjson => data
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line.trim()).map_err(|e| {
                    ExposureCliError::ParseError(format!("line {}: {}", idx + 1, e))
                })
            })
            .collect(),
    }
}

// Error handling

#[derive(Debug)]
enum ExposureCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    ParseError(String),
    NoSchools,
}

impl From<io::Error> for ExposureCliError {
    fn from(e: io::Error) -> Self {
        ExposureCliError::Io(e)
    }
}

impl From<ComputeError> for ExposureCliError {
    fn from(e: ComputeError) -> Self {
        ExposureCliError::Compute(e)
    }
}

impl From<serde_json::Error> for ExposureCliError {
    fn from(e: serde_json::Error) -> Self {
        ExposureCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ExposureCliError> for CliError {
    fn from(e: ExposureCliError) -> Self {
        match e {
            ExposureCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ExposureCliError::Compute(e) => {
                let hint = match &e {
                    ComputeError::InvalidTimezone(_) | ComputeError::InvalidConfig(_) => {
                        "Run 'exposure config' to see a valid configuration"
                    }
                    ComputeError::InvalidWeekSelector(_) => "Use 'latest' or an ISO week such as 2024-W19",
                    ComputeError::NoWeeklyData(_) => "Pick one of the available weeks",
                    _ => "Check the input files",
                };
                CliError {
                    code: "COMPUTE_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ExposureCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ExposureCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be one JSON reading".to_string()),
            },
            ExposureCliError::NoSchools => CliError {
                code: "NO_SCHOOLS".to_string(),
                message: "School registry is empty after loading".to_string(),
                hint: Some("Check school ids and coordinates".to_string()),
            },
        }
    }
}
