use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use halalan_archive::{
    CityDataFetcher, DatasetSource, FileDatasetSource, HttpDatasetSource, PersistentCache,
};
use halalan_common::{Config, NegativeCachePolicy, RaceCategory};
use halalan_map::locality::load_localities;
use halalan_map::output::{enriched_collection, write_json, write_snapshot, Legend};
use halalan_map::session::ALL;
use halalan_map::{BatchScheduler, RunFilter, RunSession, SchedulerMode};

#[derive(Parser)]
#[command(name = "halalan-map")]
#[command(about = "Barangay-level election results for the map renderer")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// sqlx SQLite URL of the dataset cache (overrides HALALAN_CACHE_URL)
    #[arg(long, global = true)]
    cache_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tally every locality and write the enriched FeatureCollection
    Render(RenderArgs),

    /// Remove every cached city dataset, negatives included
    ClearCache,
}

#[derive(Args)]
struct RenderArgs {
    /// GeoJSON locality list (file path or http(s) URL)
    #[arg(long)]
    localities: String,

    /// Where to write the enriched FeatureCollection
    #[arg(short, long)]
    output: PathBuf,

    /// Where to write the winner legend
    #[arg(long)]
    legend: Option<PathBuf>,

    #[arg(long, default_value = ALL)]
    region: String,

    #[arg(long, default_value = ALL)]
    province: String,

    #[arg(long, default_value = ALL)]
    city: String,

    /// senatorial | party_list
    #[arg(long, default_value = "senatorial")]
    category: RaceCategory,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Progress cadence, in batches
    #[arg(long)]
    progress_every: Option<usize>,

    /// Run batches back to back instead of refilling slots as they free up
    #[arg(long)]
    barrier: bool,

    /// Attach the full per-candidate tally to each feature
    #[arg(long)]
    full_tally: bool,

    /// Rewrite the output after every progress interval
    #[arg(long)]
    progressive: bool,

    /// Use a throwaway in-memory cache
    #[arg(long)]
    no_cache: bool,

    /// run | persistent
    #[arg(long)]
    negative_cache: Option<NegativeCachePolicy>,

    /// Dataset root: http(s) base URL or local directory
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    http_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = Config::from_env()?;
    if let Some(url) = cli.cache_url {
        config.cache_url = url;
    }

    match cli.command {
        Commands::Render(args) => render(config, args).await,
        Commands::ClearCache => clear_cache(&config).await,
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("halalan=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn render(mut config: Config, args: RenderArgs) -> Result<()> {
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(progress_every) = args.progress_every {
        config.progress_every = progress_every;
    }
    if let Some(policy) = args.negative_cache {
        config.negative_cache = policy;
    }
    if args.http_timeout_secs.is_some() {
        config.http_timeout_secs = args.http_timeout_secs;
    }
    config.log_redacted();

    let mode = if args.barrier {
        SchedulerMode::Barrier
    } else {
        SchedulerMode::Pool
    };
    let scheduler = BatchScheduler::new(config.batch_size)?
        .with_mode(mode)
        .with_progress_every(config.progress_every);

    let localities = load_localities(&args.localities).await?;

    let cache = Arc::new(if args.no_cache {
        PersistentCache::in_memory()
    } else {
        PersistentCache::new(config.cache_url.clone())
    });
    match cache.len().await {
        Ok(entries) => info!(entries, "Dataset cache ready"),
        Err(e) => warn!(error = %e, "Dataset cache unavailable, continuing without it"),
    }

    let source = dataset_source(&config)?;
    let fetcher = CityDataFetcher::new(cache, source, config.negative_cache);
    let filter = RunFilter::new(&args.region, &args.province, &args.city);
    let session = RunSession::new(fetcher, filter, args.category);

    let output = args.output.as_path();
    let full_tally = args.full_tally;
    let progressive = args.progressive;
    let report = session
        .run(&scheduler, &localities.features, |so_far| {
            if !progressive {
                return;
            }
            let snapshot = enriched_collection(so_far, full_tally).and_then(|collection| {
                tokio::task::block_in_place(|| write_snapshot(output, &collection))
            });
            if let Err(e) = snapshot {
                warn!(error = %e, "Progress snapshot failed");
            }
        })
        .await;

    let collection = enriched_collection(&report.features, full_tally)?;
    write_json(output, &collection)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    if let Some(legend_path) = args.legend.as_deref() {
        write_legend(legend_path, &Legend::from_report(&report)).await?;
    }

    info!(
        run_id = %report.run_id,
        features = report.features.len(),
        winners = report.winners.len(),
        output = %output.display(),
        "Map data written"
    );
    Ok(())
}

async fn write_legend(path: &Path, legend: &Legend) -> Result<()> {
    write_json(path, legend)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

fn dataset_source(config: &Config) -> Result<Arc<dyn DatasetSource>> {
    let base = config.base_url.as_str();
    if base.starts_with("http://") || base.starts_with("https://") {
        let timeout = config.http_timeout_secs.map(Duration::from_secs);
        Ok(Arc::new(HttpDatasetSource::new(base, timeout)?))
    } else {
        Ok(Arc::new(FileDatasetSource::new(base)))
    }
}

async fn clear_cache(config: &Config) -> Result<()> {
    let cache = PersistentCache::new(config.cache_url.clone());
    let removed = cache
        .clear()
        .await
        .with_context(|| format!("clearing cache at {}", config.cache_url))?;
    info!(removed, "Dataset cache cleared");
    Ok(())
}
