//! attack-sync binary.
//!
//! Reads `attack-sync.toml` (or the path given with `--config`), opens the
//! SQLite catalog, and either runs syncs or reports their state.
//!
//! ```
//! attack-sync run --domain enterprise --domain mobile
//! attack-sync run --domain ics --full --timeout-secs 600
//! attack-sync status
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use attack_core::{
  CatalogDomain, catalog::CatalogCounts, store::CatalogStore, sync_state::SyncState,
};
use attack_store_sqlite::SqliteStore;
use attack_sync::{DomainLocks, SyncConfig, SyncOptions, Syncer};
use attack_taxii::TaxiiClient;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Synchronise the MITRE ATT&CK catalog into SQLite")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "attack-sync.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Pull one or more domains from the TAXII server.
  Run {
    /// Domain to sync; repeat for several. Domains run concurrently.
    #[arg(short, long = "domain", required = true, value_parser = parse_domain)]
    domains: Vec<CatalogDomain>,

    /// Ignore the stored watermark and fetch everything.
    #[arg(long)]
    full: bool,

    /// `added_after` to use instead of the stored watermark.
    #[arg(long, conflicts_with = "full")]
    since: Option<String>,

    /// Give up on a domain after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
  },

  /// Print sync state and row counts as JSON.
  Status {
    #[arg(short, long, value_parser = parse_domain)]
    domain: Option<CatalogDomain>,
  },
}

#[derive(Serialize)]
struct DomainStatus {
  domain: CatalogDomain,
  state:  Option<SyncState>,
  counts: CatalogCounts,
}

fn parse_domain(s: &str) -> Result<CatalogDomain, String> {
  s.parse().map_err(|e: attack_core::Error| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries the JSON output.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = SyncConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let store_path = cfg.resolved_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Run {
      domains,
      full,
      since,
      timeout_secs,
    } => {
      let client = TaxiiClient::new(cfg.taxii.clone()).context("failed to build TAXII client")?;
      let deadline = timeout_secs.or(cfg.timeout_secs).map(Duration::from_secs);
      let syncer = Arc::new(Syncer::new(store, client));
      run(syncer, domains, SyncOptions { full, since }, deadline).await
    }
    Command::Status { domain } => status(&store, domain).await,
  }
}

async fn run(
  syncer: Arc<Syncer<SqliteStore, TaxiiClient>>,
  domains: Vec<CatalogDomain>,
  options: SyncOptions,
  deadline: Option<Duration>,
) -> anyhow::Result<()> {
  let locks = DomainLocks::new();
  let mut tasks = JoinSet::new();

  for domain in domains {
    let Some(permit) = locks.try_acquire(domain) else {
      tracing::warn!(%domain, "domain listed twice; running it once");
      continue;
    };
    let syncer = Arc::clone(&syncer);
    let options = options.clone();
    tasks.spawn(async move {
      let _permit = permit;
      let result = match deadline {
        Some(deadline) => syncer.run_sync_with_deadline(domain, options, deadline).await,
        None => syncer.run_sync(domain, options).await,
      };
      (domain, result)
    });
  }

  let mut failed = Vec::new();
  while let Some(joined) = tasks.join_next().await {
    let (domain, result) = joined.context("sync task panicked")?;
    match result {
      Ok(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
      Err(_) => failed.push(domain.to_string()),
    }
  }

  if !failed.is_empty() {
    anyhow::bail!("sync failed for: {}", failed.join(", "));
  }
  Ok(())
}

async fn status(store: &SqliteStore, domain: Option<CatalogDomain>) -> anyhow::Result<()> {
  let domains = match domain {
    Some(domain) => vec![domain],
    None => CatalogDomain::ALL.to_vec(),
  };

  let mut report = Vec::with_capacity(domains.len());
  for domain in domains {
    report.push(DomainStatus {
      domain,
      state: store
        .get_sync_state(domain)
        .await
        .with_context(|| format!("failed to read sync state for {domain}"))?,
      counts: store
        .catalog_counts(domain)
        .await
        .with_context(|| format!("failed to count rows for {domain}"))?,
    });
  }

  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}
