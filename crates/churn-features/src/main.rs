//! CLI entry point for the churn feature pipeline.

use anyhow::{Context, Result, anyhow};
use churn_features::{
    EncodingContract, FeatureError, InferenceSession, OutputFormat, Pipeline, PipelineConfig,
    PipelineOutput, RawRecord, ScalerState, TELCO_CONTRACT_VERSION, source_for_path,
};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// CLI-compatible output format enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutputFormat {
    /// Comma-separated values with a header row
    Csv,
    /// One JSON object per row
    Jsonl,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(cli: CliOutputFormat) -> Self {
        match cli {
            CliOutputFormat::Csv => OutputFormat::Csv,
            CliOutputFormat::Jsonl => OutputFormat::JsonLines,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Contract-driven feature encoding for churn classifiers",
    long_about = "Turns raw Telco customer records into model-ready feature tables.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  RUST_LOG              Overrides --log-level\n  \
                  CHURN_CONTRACT_VERSION  Default for --expected-version\n\n\
                  EXAMPLES:\n  \
                  # Encode a CSV export with the built-in contract\n  \
                  churn-features process telco.csv -o out/\n\n  \
                  # Encode a document-store export and standardize features\n  \
                  churn-features process customers.jsonl --scale\n\n  \
                  # Encode one customer for prediction\n  \
                  churn-features encode --record '{\"gender\": \"Male\", ...}'"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output, only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print results as JSON to stdout (disables logging)
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a batch of records into a feature table
    Process {
        /// Input file (.csv, .json, .jsonl or .ndjson)
        input: PathBuf,

        /// Output directory for artifacts
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Base name for written artifacts (without extension)
        #[arg(long, default_value = "telco_features")]
        output_name: String,

        /// Format of the emitted feature table
        #[arg(long, value_enum, default_value = "csv")]
        format: CliOutputFormat,

        /// Largest fraction of rows the cleaner may drop (0.0 - 1.0)
        #[arg(long, default_value = "0.05")]
        max_drop_rate: f64,

        /// Standardize features and save the fitted scaler
        #[arg(long)]
        scale: bool,

        /// Apply a previously fitted scaler instead of fitting one
        #[arg(long, conflicts_with = "scale")]
        scaler: Option<PathBuf>,

        /// Contract file to encode with (defaults to the built-in contract)
        #[arg(long)]
        contract: Option<PathBuf>,

        /// Refuse to run unless the contract has this version
        #[arg(long, env = "CHURN_CONTRACT_VERSION")]
        expected_version: Option<String>,

        /// Run without writing any artifacts
        #[arg(long)]
        no_save: bool,

        /// Leave the target column out of the emitted table
        #[arg(long)]
        no_target: bool,
    },

    /// Encode a single record for prediction
    Encode {
        /// JSON file holding one record
        #[arg(long, conflicts_with = "record")]
        file: Option<PathBuf>,

        /// Inline JSON object holding one record
        #[arg(long)]
        record: Option<String>,

        /// Contract file to encode with (defaults to the built-in contract)
        #[arg(long)]
        contract: Option<PathBuf>,

        /// Fitted scaler state to apply after encoding
        #[arg(long)]
        scaler: Option<PathBuf>,

        /// Version the model was trained with
        #[arg(long, env = "CHURN_CONTRACT_VERSION", default_value = TELCO_CONTRACT_VERSION)]
        expected_version: String,
    },

    /// Print the built-in encoding contract
    Contract {
        /// Write the contract to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `--log-level`. With `--json` nothing is logged so
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // Load environment variables from .env file before clap reads env defaults
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    let result = match &args.command {
        Command::Process { .. } => run_process(&args),
        Command::Encode { .. } => run_encode(&args),
        Command::Contract { output } => run_contract(output.as_deref()),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
        if args.json {
            print_json_error(e)?;
        }
    }
    result
}

fn load_contract(path: Option<&Path>) -> Result<Arc<EncodingContract>> {
    match path {
        Some(path) => {
            let contract = EncodingContract::load(path)
                .with_context(|| format!("Failed to load contract {}", path.display()))?;
            info!("Loaded contract {} from {}", contract.version(), path.display());
            Ok(Arc::new(contract))
        }
        None => Ok(EncodingContract::telco_v1()),
    }
}

fn load_scaler(path: Option<&Path>) -> Result<Option<ScalerState>> {
    path.map(|p| {
        ScalerState::load(p).with_context(|| format!("Failed to load scaler {}", p.display()))
    })
    .transpose()
}

fn run_process(args: &Args) -> Result<()> {
    let Command::Process {
        input,
        output,
        output_name,
        format,
        max_drop_rate,
        scale,
        scaler,
        contract,
        expected_version,
        no_save,
        no_target,
    } = &args.command
    else {
        return Err(anyhow!("process called with another command"));
    };

    if !input.exists() {
        return Err(anyhow!("Input file not found: {}", input.display()));
    }

    let mut config_builder = PipelineConfig::builder()
        .output_dir(output)
        .output_name(output_name)
        .output_format((*format).into())
        .max_drop_rate(*max_drop_rate)
        .enable_scaling(*scale)
        .save_to_disk(!no_save)
        .include_target(!no_target);

    if let Some(version) = expected_version {
        config_builder = config_builder.expected_contract_version(version);
    }

    let mut pipeline_builder = Pipeline::builder()
        .config(config_builder.build()?)
        .contract(load_contract(contract.as_deref())?);

    if let Some(state) = load_scaler(scaler.as_deref())? {
        pipeline_builder = pipeline_builder.scaler_state(state);
    }

    let pipeline = pipeline_builder.build()?;
    let mut source = source_for_path(input)?;

    info!("{}", "=".repeat(80));
    info!("Encoding {}", source.describe());
    info!("{}", "=".repeat(80));

    let result = pipeline.process(source.as_mut())?;
    print_process_summary(&result, args.json)
}

fn print_process_summary(result: &PipelineOutput, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&result.audit)?);
        return Ok(());
    }

    let audit = &result.audit;
    println!();
    println!("{}", "=".repeat(80));
    println!("ENCODING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();
    println!("Source:   {}", audit.source);
    println!(
        "Contract: {} ({})",
        audit.contract_version,
        &audit.contract_fingerprint[..audit.contract_fingerprint.len().min(12)]
    );
    println!(
        "Rows:     {} -> {} ({} dropped, {:.2}%)",
        audit.rows_before,
        audit.rows_after,
        audit.rows_dropped,
        audit.drop_rate() * 100.0
    );
    println!("Shape:    {} x {}", audit.shape.0, audit.shape.1);
    println!("Scaled:   {}", if audit.scaled { "yes" } else { "no" });
    println!("Duration: {}ms", audit.duration_ms);

    if !result.dropped_rows.is_empty() {
        println!();
        println!("Dropped rows:");
        for dropped in result.dropped_rows.iter().take(10) {
            println!("  row {} ({}): {}", dropped.row, dropped.column, dropped.reason);
        }
        if result.dropped_rows.len() > 10 {
            println!("  ... and {} more", result.dropped_rows.len() - 10);
        }
    }

    if !audit.artifacts.is_empty() {
        println!();
        println!("Artifacts:");
        for path in &audit.artifacts {
            println!("  {}", path.display());
        }
    }
    println!();
    Ok(())
}

fn run_encode(args: &Args) -> Result<()> {
    let Command::Encode {
        file,
        record,
        contract,
        scaler,
        expected_version,
    } = &args.command
    else {
        return Err(anyhow!("encode called with another command"));
    };

    let document = match (file, record) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, Some(inline)) => inline.clone(),
        (None, None) => return Err(anyhow!("Provide a record with --file or --record")),
    };
    let record: RawRecord =
        serde_json::from_str(&document).context("Record must be a flat JSON object")?;

    let mut session = InferenceSession::new(load_contract(contract.as_deref())?, expected_version)?;
    if let Some(state) = load_scaler(scaler.as_deref())? {
        session = session.with_scaler(state)?;
    }

    let features = session.encode_named(&record)?;

    if args.json {
        let vector: Vec<f64> = features.iter().map(|f| f.value).collect();
        let report = serde_json::json!({
            "contract_version": session.contract().version(),
            "scaled": session.is_scaled(),
            "features": features,
            "vector": vector,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for feature in &features {
            println!("{:<18} {}", feature.name, feature.value);
        }
    }
    Ok(())
}

fn run_contract(output: Option<&Path>) -> Result<()> {
    let contract = EncodingContract::telco_v1();
    match output {
        Some(path) => {
            contract.save(path)?;
            info!("Contract {} written to {}", contract.version(), path.display());
        }
        None => println!("{}", contract.to_json_pretty()?),
    }
    Ok(())
}

/// Structured error on stdout for `--json` callers.
fn print_json_error(err: &anyhow::Error) -> Result<()> {
    let body = match err.downcast_ref::<FeatureError>() {
        Some(feature_error) => serde_json::to_value(feature_error)?,
        None => serde_json::json!({ "code": "CLI_ERROR", "message": format!("{:#}", err) }),
    };
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "error": body }))?);
    Ok(())
}
