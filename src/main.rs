use chrono::NaiveDate;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prtempo::cache::{CacheStorage, FileStorage, NoopStorage};
use prtempo::config::Config;
use prtempo::github::CachedGitHubClient;
use prtempo::metrics;

#[derive(Parser, Debug)]
#[command(name = "prtempo")]
#[command(about = "Pull request flow metrics from GitHub history")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./prtempo.yaml, then $XDG_CONFIG_HOME/prtempo/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Repository owner
  #[arg(long)]
  owner: Option<String>,

  /// Repository name
  #[arg(long)]
  repo: Option<String>,

  /// Only collect this pull request
  #[arg(long)]
  pr: Option<u64>,

  /// Only collect pull requests created on or after this date (YYYY-MM-DD)
  #[arg(long)]
  since: Option<NaiveDate>,

  /// Maximum pages per paginated resource
  #[arg(long)]
  page_limit: Option<u32>,

  /// Seconds to wait before each CI server request
  #[arg(long)]
  ci_delay: Option<f64>,

  /// Bypass the request cache
  #[arg(long)]
  no_cache: bool,

  /// Delete the request cache before running
  #[arg(long)]
  clear_cache: bool,

  /// Output directory for the JSON reports
  #[arg(short, long)]
  output: Option<PathBuf>,
}

impl Args {
  fn apply(self, mut config: Config) -> Config {
    if let Some(owner) = self.owner {
      config.github.owner = owner;
    }
    if let Some(repo) = self.repo {
      config.github.repo = repo;
    }
    if self.pr.is_some() {
      config.fetch.pr_number = self.pr;
    }
    if self.since.is_some() {
      config.fetch.since = self.since;
    }
    if let Some(page_limit) = self.page_limit {
      config.fetch.page_limit = page_limit;
    }
    if let Some(delay) = self.ci_delay {
      config.fetch.ci_request_delay_secs = delay;
    }
    if self.no_cache {
      config.cache.enabled = false;
    }
    if let Some(output) = self.output {
      config.output_dir = output;
    }
    config
  }
}

/// Log to stderr, and to `log_file` too when one is configured.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let (file_layer, guard) = match log_file {
    Some(path) => {
      let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::never(dir, name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_writer(writer).with_ansi(false)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "prtempo=info".into()))
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(file_layer)
    .init();

  Ok(guard)
}

async fn run<S: CacheStorage>(config: &Config, storage: S, clear_cache: bool) -> Result<()> {
  let client = CachedGitHubClient::new(config, storage)?;
  if clear_cache {
    client.clear_cache()?;
    info!("Cleared request cache");
  }

  let prs = client.pull_requests(&config.fetch).await;
  let records = metrics::collect(&client, &prs).await;
  metrics::write_report(&config.output_dir, &records)?;

  let stats = client.stats();
  info!(
    hits = stats.hits,
    misses = stats.misses,
    stores = stats.stores,
    "Cache statistics"
  );
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let mut args = Args::parse();
  let clear_cache = args.clear_cache;
  let config_path = args.config.take();

  let config = args.apply(Config::load(config_path.as_deref())?);
  config.validate()?;

  let _guard = init_tracing(config.log_file.as_deref())?;
  info!(
    owner = %config.github.owner,
    repo = %config.github.repo,
    "Collecting pull request metrics"
  );

  if config.cache.enabled {
    let root = match &config.cache.dir {
      Some(dir) => dir.clone(),
      None => FileStorage::default_root()?,
    };
    info!(root = %root.display(), "Using request cache");
    run(&config, FileStorage::open(root), clear_cache).await
  } else {
    run(&config, NoopStorage::default(), clear_cache).await
  }
}
