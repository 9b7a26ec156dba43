//! The editlens binary: batch analysis plus the repair, schema and classify
//! diagnostics.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use editlens::prelude::*;
use editlens_extract::repair;
use editlens_resilience::{classify_message, suggested_delay_ms};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a category batch for one video and writes the result as JSON
    Analyze {
        /// Video context file (title, durationSecs, transcript, commentary)
        #[arg(long)]
        video: PathBuf,
        /// Categories to analyse, in order (default: all)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<Category>,
        /// Config file (overrides EDITLENS_CONFIG and the default location)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Repairs near-JSON model output from a file or stdin
    Repair {
        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },
    /// Prints a category's JSON schema
    Schema {
        /// Category identifier
        category: Category,
    },
    /// Classifies a provider error message
    Classify {
        /// Error message text
        message: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Analyze {
            video,
            categories,
            config,
            output,
        } => run_analyze(&video, categories, config, output).await,
        Commands::Repair { file } => run_repair(file),
        Commands::Schema { category } => run_schema(category),
        Commands::Classify { message } => {
            run_classify(&message);
            Ok(())
        }
    }
}

async fn run_analyze(
    video_path: &Path,
    categories: Vec<Category>,
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = EditlensConfig::load(config_path.as_deref())?;

    let content = std::fs::read_to_string(video_path)
        .with_context(|| format!("reading video context {}", video_path.display()))?;
    let video: VideoContext = serde_json::from_str(&content)
        .with_context(|| format!("parsing video context {}", video_path.display()))?;

    let categories = if categories.is_empty() {
        Category::ALL.to_vec()
    } else {
        categories
    };

    let provider = Arc::new(CommandProvider::discover(config.command_config())?);
    let registry = Arc::new(SchemaRegistry::new()?);
    let tasks = AnalysisTask::for_categories(&categories, &Arc::new(video), &registry)?;

    let orchestrator = CategoryOrchestrator::from_config(provider, registry, &config)
        .with_progress(|percent, message| {
            if let Some(message) = message {
                eprintln!("[{percent:>3}%] {message}");
            }
        });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(event = "interrupt", "interrupt");
            on_interrupt.cancel();
        }
    });

    let result = orchestrator.run_batch(&tasks, &cancel).await;
    let json = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }

    eprintln!(
        "{}/{} categories analysed{}",
        result.succeeded(),
        result.categories.len(),
        if result.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

fn run_repair(file: Option<PathBuf>) -> anyhow::Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    println!("{}", repair(&text));
    Ok(())
}

fn run_schema(category: Category) -> anyhow::Result<()> {
    let registry = SchemaRegistry::new()?;
    println!("{}", serde_json::to_string_pretty(registry.schema(category)?)?);
    Ok(())
}

fn run_classify(message: &str) {
    let kind = classify_message(message);
    let verdict = serde_json::json!({
        "kind": kind,
        "label": kind.label(),
        "retryable": kind.is_retryable(),
        "modelFault": kind.is_model_fault(),
        "suggestedDelayMs": suggested_delay_ms(message),
    });
    println!("{verdict:#}");
}
