//! oaharvest - OpenAlex works harvester
//!
//! Fetches every matching work (cursor mode) or a random sample (sampling mode)
//! and writes flattened rows to `papers_batch_<n>.csv` files.
//!
//! ## Usage
//!
//! ```bash
//! oaharvest --mode all --file ml.txt --percentage 10
//! oaharvest --mode random --file ml.txt --max-papers 500
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use oaharvest::{
    openalex::OPENALEX_API_BASE, retry::RetryPolicy, CsvBatchWriter, FetchMode, Mode,
    OpenAlexClient, Query, Retriever, RetrieverConfig,
};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Fetch and flatten OpenAlex works for a set of search conditions
#[derive(Parser)]
#[command(name = "oaharvest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Fetch mode: 'all' for the complete result set, 'random' for random sampling
    #[arg(short, long, value_enum)]
    mode: FetchMode,

    /// Path to the search conditions file (key,value lines)
    #[arg(short, long)]
    file: PathBuf,

    /// Output folder (default: input file path without extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Percentage of each batch to save in 'all' mode (0-100]
    #[arg(short, long, default_value_t = 100.0)]
    percentage: f64,

    /// Maximum number of papers to fetch (required for 'random' mode)
    #[arg(short = 'n', long)]
    max_papers: Option<usize>,

    /// Contact email for the OpenAlex polite pool
    #[arg(long)]
    mailto: Option<String>,

    /// API base URL
    #[arg(long, default_value = OPENALEX_API_BASE)]
    base_url: String,

    /// Consecutive failed requests tolerated before giving up (0 = never give up)
    #[arg(long, default_value_t = RetryPolicy::default().max_attempts)]
    max_retries: u32,

    /// Seed for the local RNG, for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    if let Err(e) = run(cli).await {
        error!(error = %e, "Harvest failed");
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    // Configuration errors surface here, before any request is sent
    let mode = Mode::from_args(cli.mode, cli.max_papers, cli.percentage)?;
    let query = Query::from_conditions_file(&cli.file)?;
    let output_folder = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.file.with_extension(""));

    let config = RetrieverConfig {
        retry: RetryPolicy {
            max_attempts: cli.max_retries,
            ..RetryPolicy::default()
        },
        rng_seed: cli.seed,
        ..RetrieverConfig::default()
    };

    let client = OpenAlexClient::with_base_url(&cli.base_url, cli.mailto.clone())
        .context("Failed to create OpenAlex client")?;
    let mut retriever = Retriever::new(client, config);
    let mut sink = CsvBatchWriter::new(&output_folder);

    println!("Search terms: {}", query.search_terms);
    if let (Some(start), Some(end)) = (query.start_year, query.end_year) {
        println!("Years: {}-{}", start, end);
    }
    println!("Output folder: {}", sink.dir().display());

    info!(mode = ?mode, "Starting harvest");
    let summary = retriever.retrieve(&query, mode, &mut sink).await?;

    match mode {
        Mode::Exhaustive { retention } => {
            if let Some(total) = summary.api_total {
                println!("Total count according to API: {}", total);
            }
            println!(
                "Retrieved {} results, saved {} ({}%) in {} batch file(s)",
                summary.retrieved,
                summary.saved,
                retention.fraction() * 100.0,
                summary.batches
            );
        }
        Mode::Sampling { cap } => {
            println!(
                "Retrieved {} of {} requested random samples in {} batch file(s)",
                summary.retrieved, cap, summary.batches
            );
        }
    }

    println!(
        "\n✓ Successfully saved {} results in: {}",
        summary.saved,
        sink.dir().display()
    );
    Ok(())
}
