//! giftdrop CLI - checkpointed, resumable batch gift drops.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use giftdrop::client::{
    DecisionProvider, FixedDecision, InteractivePrompt, Pinner, RandomKeys,
};
use giftdrop::files::rename_files;
use giftdrop::{
    CheckpointStore, GatewayLedger, GiftdropError, PinataClient, RunStats, WorkflowConfig,
    WorkflowContext, WorkflowPipeline,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "giftdrop")]
#[command(version)]
#[command(about = "Checkpointed, resumable batch gift drops: mint, pin and fund per beneficiary")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct WorkflowArgs {
    /// Path to the workflow configuration file
    config: PathBuf,

    /// Validate only; no ledger writes, no pinning, no checkpoint files
    #[arg(long)]
    dry_run: bool,

    /// Answer yes to every confirmation question
    #[arg(short, long)]
    yes: bool,

    /// Checkpoint directory for resumable runs
    #[arg(long, default_value = ".checkpoint")]
    checkpoint_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full gift drop workflow
    Run(WorkflowArgs),

    /// Re-publish instance metadata for an already minted drop
    UpdateMetadata(WorkflowArgs),

    /// Renumber media files to `<index>.<ext>` in name order
    RenameFiles {
        /// Folder holding the files
        input: PathBuf,

        /// Extension of the files to rename
        #[arg(short, long)]
        ext: String,

        /// First index to assign
        #[arg(short, long, default_value = "0")]
        start_index: usize,
    },

    /// Validate a workflow configuration file
    Validate {
        /// Path to the workflow configuration file
        config: PathBuf,
    },

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# giftdrop workflow configuration

[network]
url = "http://localhost:8080"
# apiKey = "${LEDGER_API_KEY}"
timeoutSecs = 120
decimals = 12

[pinata]
# apiKey and secretKey can also come from PINATA_API_KEY / PINATA_SECRET_KEY
# apiKey = "..."
# secretKey = "..."

[class]
id = "42"

[class.metadata]
name = "Winter Gifts"
description = "One gift per guest"
imageFile = "media/class.png"

[instance]
batchSize = 100
initialFund = "1.5"

[instance.data]
csvFile = "guests.csv"
offset = 0
# count = 500
# outputCsvFile = "guests-output.csv"

[instance.metadata]
name = "Gift for {{name}}"
description = "Gift #{}"
imageFolder = "media/instances"
fileNameTemplate = "{}.png"
# videoFileNameTemplate = "{}.mp4"
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<WorkflowConfig> {
    WorkflowConfig::from_file(path)
        .map_err(GiftdropError::from)
        .with_context(|| format!("Failed to load config from {path:?}"))
}

fn build_pinner(config: &WorkflowConfig) -> Result<Arc<dyn Pinner>> {
    let needs_pinning = config.class.metadata.is_some() || config.instance.metadata.is_some();
    let (api_key, secret_key) = if needs_pinning {
        config.resolve_pinata_keys().map_err(GiftdropError::from)?
    } else {
        (String::new(), String::new())
    };
    Ok(Arc::new(PinataClient::new(
        config.pinata.url.clone(),
        api_key,
        secret_key,
    )))
}

fn build_context(config: &WorkflowConfig, args: &WorkflowArgs) -> Result<WorkflowContext> {
    let ledger = Arc::new(GatewayLedger::new(
        config.network.url.clone(),
        config.resolve_ledger_api_key(),
        config.network.timeout_secs,
    )?);
    let pinner = build_pinner(config)?;
    let store = CheckpointStore::new(&args.checkpoint_dir);

    Ok(WorkflowContext::load(
        config,
        store,
        ledger,
        pinner,
        args.dry_run,
    )?)
}

fn decisions(yes: bool) -> Box<dyn DecisionProvider> {
    if yes {
        Box::new(FixedDecision::new(true))
    } else {
        Box::new(InteractivePrompt)
    }
}

fn print_summary(title: &str, stats: &RunStats, output: &Path) {
    println!("\n=== {title} Complete ===");
    println!("Stage:       {}", stats.stage);
    println!("Records:     {}", stats.records);
    println!("Secrets:     {}", stats.secrets_generated);
    println!("Pinned:      {}", stats.metadata_pinned);
    println!("Batches:     {}", stats.batches_submitted);
    println!("Runtime:     {:.1}s", stats.runtime_secs);
    if stats.dry_run {
        println!("Dry run:     nothing was written");
    } else {
        println!("Output:      {output:?}");
    }
}

async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate { config } => {
            let config = load_config(&config)?;
            if config.class.metadata.is_some() || config.instance.metadata.is_some() {
                if let Err(e) = config.resolve_pinata_keys() {
                    warn!("{e}");
                }
            }

            info!("Configuration is valid");
            info!("  Ledger:       {}", config.network.url);
            info!("  Class:        {}", config.class.id);
            info!("  Data:         {:?}", config.instance.data.csv_file);
            info!("  Batch size:   {}", config.instance.batch_size);
            match config.initial_fund_units().map_err(GiftdropError::from)? {
                Some(units) => info!("  Initial fund: {units} base units"),
                None => info!("  Initial fund: none"),
            }
            info!(
                "  Metadata:     class={} instance={}",
                config.class.metadata.is_some(),
                config.instance.metadata.is_some()
            );
        }

        Commands::RenameFiles {
            input,
            ext,
            start_index,
        } => {
            let renamed = rename_files(&input, &ext, start_index)?;
            println!("Renamed {} files in {input:?}", renamed.len());
        }

        Commands::Run(args) => {
            let config = load_config(&args.config)?;
            let mut ctx = build_context(&config, &args)?;
            let decisions = decisions(args.yes);
            let keys = RandomKeys;

            let pipeline = WorkflowPipeline::new(&config, decisions.as_ref(), &keys);
            let stats = pipeline.run(&mut ctx).await?;
            print_summary("Gift Drop", &stats, &config.instance.data.output_path());
        }

        Commands::UpdateMetadata(args) => {
            let config = load_config(&args.config)?;
            let mut ctx = build_context(&config, &args)?;
            let decisions = decisions(args.yes);
            let keys = RandomKeys;

            let pipeline = WorkflowPipeline::new(&config, decisions.as_ref(), &keys);
            let stats = pipeline.update_metadata(&mut ctx).await?;
            print_summary("Metadata Update", &stats, &config.instance.data.output_path());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<GiftdropError>() {
                Some(e) if e.is_domain() => eprintln!("Error: {e}"),
                _ => eprintln!("{err:?}"),
            }
            ExitCode::FAILURE
        }
    }
}
