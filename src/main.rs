use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use wikiplain::config::{self, PipelineConfig};
use wikiplain::markup::WikitextStripper;
use wikiplain::pipeline::{Pipeline, RunSummary};
use wikiplain::report::{FailureKind, FailureLog};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikiplain")]
#[command(about = "Convert MediaWiki XML dumps into a plain-text corpus")]
struct Cli {
    /// Path to the dump file (.xml or .xml.bz2)
    #[arg(short, long)]
    input: PathBuf,

    /// Output text file (appended to unless --fresh)
    #[arg(short, long)]
    output: PathBuf,

    /// Failure log file
    #[arg(long, default_value = config::DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Records per batch handed to the writers
    #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Writer threads (defaults to cores + 4, at most 32)
    #[arg(long)]
    workers: Option<usize>,

    /// Batches allowed to be queued or running at once (defaults to 2 x workers)
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Reject pages whose body exceeds this many bytes
    #[arg(long)]
    max_body_bytes: Option<usize>,

    /// Limit number of pages to process (for testing)
    #[arg(long)]
    limit: Option<u64>,

    /// Truncate the output file before starting
    #[arg(long)]
    fresh: bool,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.input, &self.output)
            .with_batch_size(self.batch_size)
            .with_fresh(self.fresh)
            .with_progress(!self.no_progress);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(n) = self.max_in_flight {
            config = config.with_max_in_flight(n);
        }
        if let Some(n) = self.max_body_bytes {
            config = config.with_max_body_bytes(n);
        }
        if let Some(n) = self.limit {
            config = config.with_limit(n);
        }
        config
    }
}

fn open_failure_log(path: &Path) -> FailureLog {
    match FailureLog::open(path) {
        Ok(log) => log,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to open log file, failures go to the console only");
            FailureLog::in_memory()
        }
    }
}

fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write summary file: {}", path.display()))
}

fn print_summary(summary: &RunSummary, failures: &FailureLog) {
    let stats = &summary.stats;
    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", summary.elapsed_secs);
    println!();
    println!("Pages extracted:    {}", stats.records_extracted);
    println!("Pages cleaned:      {}", stats.records_cleaned);
    println!("Pages skipped:      {}", stats.records_rejected);
    println!("Pages written:      {}", stats.records_written);
    println!("Bytes written:      {}", stats.bytes_written);
    println!("Batches dispatched: {}", stats.batches_dispatched);
    println!("Batches written:    {}", stats.batches_written);
    println!("Batches failed:     {}", stats.batches_failed);
    println!(
        "Stream errors:      {}",
        failures.count(FailureKind::StreamFatal)
    );
}

fn run(cli: Cli) -> Result<bool> {
    let failures = open_failure_log(&cli.log_file);
    let pipeline = Pipeline::new(cli.pipeline_config(), WikitextStripper);

    let summary = match pipeline.run(&failures) {
        Ok(summary) => summary,
        Err(e) => {
            failures.summary(&format!("Processing terminated early: {:#}", e), false);
            return Err(e);
        }
    };
    failures.summary(&summary.message(), summary.is_completed());
    failures.close();

    if let Some(path) = &cli.summary_json {
        write_summary_json(path, &summary)?;
        info!(path = %path.display(), "Summary written");
    }

    print_summary(&summary, &failures);
    Ok(summary.is_completed())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    match run(cli) {
        Ok(true) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
