use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use blobsweep::config::{default_container_name, BenchFile, RowMode, SweepSection};
use blobsweep::report::{ConsoleSink, CsvFileSink};
use blobsweep::shutdown::Interrupts;
use blobsweep::sweep::SweepPlanner;
use blobsweep::transport::{self, RetryPolicy, TransportConfig};
use blobsweep::units::{format_bytes, parse_bytes};

#[derive(Parser)]
#[command(
    name = "blobsweep",
    about = "Block-size sweep benchmark for object-storage upload and download throughput",
    version,
    long_about = None
)]
struct Cli {
    /// TOML file with defaults for any flag
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Default log level (RUST_LOG overrides)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sweep against the storage backend
    Run(RunArgs),

    /// Print the block sizes a run would test, without touching the network
    Plan(GridArgs),
}

#[derive(Args)]
struct GridArgs {
    /// Apply block sizes from largest to smallest
    #[arg(long, overrides_with = "no_reverse")]
    reverse: bool,

    /// Apply block sizes from smallest to largest, overriding the config file
    #[arg(long, overrides_with = "reverse")]
    no_reverse: bool,

    /// First block size (e.g. 2MiB)
    #[arg(long, value_parser = parse_bytes)]
    start_block_bytes: Option<u64>,

    /// Last block size, inclusive
    #[arg(long, value_parser = parse_bytes)]
    end_block_bytes: Option<u64>,

    /// Step between block sizes
    #[arg(long, value_parser = parse_bytes)]
    increment_block_bytes: Option<u64>,
}

#[derive(Args)]
struct RunArgs {
    /// Storage connection string, or `memory://` for a local dry run
    #[arg(long, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    connection_string: Option<String>,

    #[command(flatten)]
    grid: GridArgs,

    /// Size of every uploaded blob
    #[arg(long, value_parser = parse_bytes)]
    file_size: Option<u64>,

    /// Trials per block size
    #[arg(long)]
    files: Option<u32>,

    /// Blocks in flight per upload
    #[arg(long)]
    concurrency: Option<usize>,

    /// Deadline for each single upload or download
    #[arg(long)]
    operation_timeout_secs: Option<u64>,

    /// Write results to this CSV file instead of stdout
    #[arg(long)]
    csv_file_path: Option<PathBuf>,

    /// Container to create for the run (default: blobsweep-<unix seconds>)
    #[arg(long)]
    container: Option<String>,

    /// One row per trial instead of the per-size mean
    #[arg(long)]
    per_trial: bool,

    /// Measure uploads only
    #[arg(long)]
    skip_download: bool,

    /// Print the result table as JSON when writing to stdout
    #[arg(long)]
    json: bool,

    /// Retries per backend request (default: unlimited)
    #[arg(long)]
    max_retries: Option<u32>,
}

impl GridArgs {
    fn apply(&self, section: &mut SweepSection) {
        if let Some(v) = self.start_block_bytes {
            section.start_block_bytes = v;
        }
        if let Some(v) = self.end_block_bytes {
            section.end_block_bytes = v;
        }
        if let Some(v) = self.increment_block_bytes {
            section.increment_block_bytes = v;
        }
        if self.reverse {
            section.reverse = true;
        } else if self.no_reverse {
            section.reverse = false;
        }
    }
}

impl RunArgs {
    /// Layer flags over the file's `[sweep]` section.
    fn sweep_section(&self, file: &SweepSection) -> SweepSection {
        let mut section = file.clone();
        self.grid.apply(&mut section);
        if let Some(v) = self.file_size {
            section.file_size_bytes = v;
        }
        if let Some(v) = self.files {
            section.files_per_configuration = v;
        }
        if let Some(v) = self.concurrency {
            section.concurrency = v;
        }
        if let Some(v) = self.operation_timeout_secs {
            section.operation_timeout_secs = v;
        }
        if self.per_trial {
            section.row_mode = RowMode::PerTrial;
        }
        if self.skip_download {
            section.measure_download = false;
        }
        section
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = match load_config(cli.config.as_deref()) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&file.logging.level);
    init_tracing(level, cli.log_json || file.logging.json);

    let result = match cli.command {
        Commands::Run(args) => run(args, file).await,
        Commands::Plan(grid) => plan(&grid, &file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BenchFile> {
    match path {
        Some(path) => BenchFile::load(path),
        None => Ok(BenchFile::default()),
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    // stdout is reserved for the result table.
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(args: RunArgs, file: BenchFile) -> Result<()> {
    let config = args.sweep_section(&file.sweep).to_config()?;

    let connection_string = args
        .connection_string
        .or(file.transport.connection_string)
        .context("no connection string: pass --connection-string or set AZURE_STORAGE_CONNECTION_STRING")?;
    let retry = RetryPolicy::default().with_max_retries(args.max_retries.or(file.transport.max_retries));
    let transport = transport::connect(&connection_string, &TransportConfig { retry })?;

    let container = args
        .container
        .or(file.transport.container)
        .unwrap_or_else(|| default_container_name(chrono::Utc::now()));

    tracing::info!(
        %container,
        start = %format_bytes(config.blocks.start_block_bytes),
        end = %format_bytes(config.blocks.end_block_bytes),
        increment = %format_bytes(config.blocks.increment_block_bytes),
        timeout = ?config.operation_timeout,
        "Starting blobsweep run"
    );

    let interrupts = Interrupts::ctrl_c();
    let shutdown = interrupts.clone().wait_for(1);
    let sweep = async {
        match args.csv_file_path.or(file.output.csv_file_path) {
            Some(path) => {
                let mut sink = CsvFileSink::new(path);
                blobsweep::run(&*transport, &config, &container, &mut sink, shutdown).await
            }
            None => {
                let mut sink = ConsoleSink::new(std::io::stdout(), args.json || file.output.json);
                blobsweep::run(&*transport, &config, &container, &mut sink, shutdown).await
            }
        }
    };

    tokio::select! {
        result = sweep => {
            result?;
        }
        _ = interrupts.wait_for(2) => {
            anyhow::bail!("interrupted during cleanup; container {container} may need manual deletion");
        }
    }
    Ok(())
}

fn plan(grid: &GridArgs, file: &BenchFile) -> Result<()> {
    let mut section = file.sweep.clone();
    grid.apply(&mut section);
    let config = section.to_config()?;
    let planner = SweepPlanner::new(&config.blocks)?;

    println!(
        "{} configurations, {} x {} per configuration, timeout {:?}",
        planner.step_count(),
        config.files_per_configuration,
        format_bytes(config.file_size_bytes),
        config.operation_timeout,
    );
    println!("{:<6} | {:<15} | Block Size", "Step", "Nominal");
    println!("{:-<6}-|-{:-<15}-|-{:-<15}", "", "", "");
    for (i, step) in planner.steps().enumerate() {
        println!(
            "{:<6} | {:<15} | {}",
            i + 1,
            format_bytes(step.nominal_block_size),
            format_bytes(step.effective_block_size)
        );
    }
    Ok(())
}
