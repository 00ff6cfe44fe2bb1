use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use delta_core::common::stats_error::ErrCode;
use delta_core::common::time::{parse_date, to_date_str};
use delta_core::{backfill, CsvPriceSource, CsvStore, StatsError, StoreConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Next-day move statistics bucketed by previous-day change", long_about = None)]
struct Cli {
    /// JSON store configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one statistics CSV per instrument
    #[arg(long, global = true, env = "DELTA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Round bucket keys to this many decimals instead of matching exactly
    #[arg(long, global = true)]
    key_decimals: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create empty stores
    Init {
        #[arg(required = true)]
        instruments: Vec<String>,
    },
    /// Extract observations from price files and merge them into the stores
    Ingest {
        #[arg(required = true)]
        instruments: Vec<String>,

        /// Directory with one `<instrument>.csv` of daily closes each
        #[arg(short, long)]
        prices: PathBuf,

        /// First price date (YYYY-MM-DD), earliest available when omitted
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Last price date (YYYY-MM-DD), latest available when omitted
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,
    },
    /// Print every bucket of an instrument
    Show { instrument: String },
    /// Distribution of bucket keys observed inside a date range
    Query {
        instrument: String,

        #[arg(long, value_parser = parse_date)]
        start: NaiveDate,

        #[arg(long, value_parser = parse_date)]
        end: NaiveDate,
    },
    /// List instruments with a store
    List,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = CsvStore::new(build_config(&cli)?);

    match cli.command {
        Commands::Init { instruments } => init(&store, &instruments),
        Commands::Ingest {
            instruments,
            prices,
            start,
            end,
        } => run_ingest(&store, &instruments, prices, start, end),
        Commands::Show { instrument } => show(&store, &instrument),
        Commands::Query {
            instrument,
            start,
            end,
        } => query(&store, &instrument, start, end),
        Commands::List => {
            for name in store.instruments()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

/// `RUST_LOG` when set and valid, `info` otherwise
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn build_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if cli.key_decimals.is_some() {
        config.key_decimals = cli.key_decimals;
    }
    config.check().context("Invalid store configuration")?;
    Ok(config)
}

fn init(store: &CsvStore, instruments: &[String]) -> anyhow::Result<()> {
    let mut failed = 0;
    for instrument in instruments {
        match store.initialize(instrument) {
            Ok(()) => {}
            Err(e @ StatsError::AlreadyInitialized { .. }) => info!("{}", e),
            Err(e) => {
                warn!("{}: {} ({})", instrument, e, e.errcode());
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} instruments failed to initialize", failed, instruments.len());
    }
    Ok(())
}

fn run_ingest(
    store: &CsvStore,
    instruments: &[String],
    prices: PathBuf,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let source = CsvPriceSource::new(prices);
    let start = start.unwrap_or(NaiveDate::MIN);
    let results = backfill(store, &source, instruments, start, end);

    let mut failed = 0;
    for (instrument, result) in &results {
        match result {
            Ok(report) => println!(
                "{:<10} points={:<6} observations={:<6} new={:<5} merged={:<5} duplicate={}",
                instrument,
                report.points,
                report.observations,
                report.tally.created,
                report.tally.merged,
                report.tally.duplicates
            ),
            Err(e) => {
                println!("{:<10} FAILED {}", instrument, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} instruments failed", failed, results.len());
    }
    Ok(())
}

fn show(store: &CsvStore, instrument: &str) -> anyhow::Result<()> {
    let loaded = store
        .load(instrument)
        .with_context(|| format!("Failed to load store for {}", instrument))?;
    if loaded.skipped > 0 {
        warn!("{}: {} unreadable rows skipped", instrument, loaded.skipped);
    }

    println!(
        "{:>12} {:>6} {:>10} {:>10} {:>10} {:>10}  {:<10} {:<10}",
        "key", "count", "avg_drop", "avg_rise", "max_drop", "max_rise", "first", "last"
    );
    for rec in &loaded.buckets {
        let fmt_date = |d: Option<NaiveDate>| d.as_ref().map(to_date_str).unwrap_or_default();
        println!(
            "{:>12} {:>6} {:>10.4} {:>10.4} {:>10.4} {:>10.4}  {:<10} {:<10}",
            rec.bucket_key,
            rec.occurrence_count(),
            rec.avg_drop,
            rec.avg_rise,
            rec.max_drop,
            rec.max_rise,
            fmt_date(rec.first_seen()),
            fmt_date(rec.last_seen())
        );
    }
    println!("{} buckets", loaded.buckets.len());
    Ok(())
}

fn query(store: &CsvStore, instrument: &str, start: NaiveDate, end: NaiveDate) -> anyhow::Result<()> {
    let summary = match store.query(instrument, start, end) {
        Ok(summary) => summary,
        Err(e) if e.errcode() == ErrCode::NotFound => bail!("no store for {}", instrument),
        Err(e) => return Err(e).context("Range query failed"),
    };

    println!("{} {} .. {}", instrument, summary.start, summary.end);
    for bucket in &summary.buckets {
        let share = bucket.count as f64 / summary.total as f64 * 100.0;
        println!("{:>12} {:>6} {:>6.1}%", bucket.bucket_key, bucket.count, share);
    }
    println!("{} observations in {} buckets", summary.total, summary.buckets.len());
    Ok(())
}
