use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use satfetcher::{
    CelestrakFetcher, HttpSource, LinkChecker, LinkStatus, UcsFetcher,
    celestrak::SATCAT_URL,
    links::{LinkEntry, ids_from_satcat},
    ucs::UCS_URL,
};
use satstore::{
    SatStore,
    catalog::TableStore,
    config::AppConfig,
    fetch::{Fetcher, SyncRequest},
    models::{IngestMode, IngestReport, RunLog},
    schema_registry::SCHEMA_REGISTRY,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Runs the satagent command line interface.
pub async fn run_cli() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Init => {
            let tables = init(&config).await?;
            println!("Initialized {}", config.database.base_path.display());
            for table in tables {
                println!("  {table}");
            }
        }
        Command::Ingest(args) => {
            let report = ingest(&config, &args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Links(args) => {
            let summary = check_links(&config, &args).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Runs(args) => {
            for run in runs(&config, args.limit).await? {
                println!(
                    "#{} {} -> {} [{}] {} {}",
                    run.run_id, run.source, run.table_name, run.mode, run.status, run.details
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser)]
#[command(author, version, about = "Ingest satellite catalogs and check reference links")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "SATAGENT_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates the catalog database and the default tables
    Init,
    /// Loads a SATCAT or UCS file into its table
    Ingest(IngestArgs),
    /// Validates NSSDC / Celestrak / Wikipedia pages for SATCAT objects
    Links(LinksArgs),
    /// Lists recent import runs
    Runs(RunsArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SourceArg {
    Satcat,
    Ucs,
}

impl SourceArg {
    pub fn name(self) -> &'static str {
        match self {
            SourceArg::Satcat => CelestrakFetcher::NAME,
            SourceArg::Ucs => UcsFetcher::NAME,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    Append,
    Reconcile,
}

impl From<ModeArg> for IngestMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Append => IngestMode::AppendOnly,
            ModeArg::Reconcile => IngestMode::ReconcileByKey,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(value_enum)]
    pub source: SourceArg,
    /// Read a local file instead of downloading the source
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Overrides the source's configured mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
    /// Overrides the source's configured table
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LinksArgs {
    /// Local SATCAT file to take the ids from
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Only check the first N satellites
    #[arg(long)]
    pub limit: Option<usize>,
    /// Concurrent checks
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct RunsArgs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinksSummary {
    pub checked: usize,
    pub nssdc: usize,
    pub celestrak: usize,
    pub wikipedia: usize,
    pub unknown: usize,
}

impl LinksSummary {
    fn from_entries(entries: &[LinkEntry]) -> Self {
        let count = |pick: fn(&LinkEntry) -> LinkStatus| {
            entries
                .iter()
                .filter(|&e| pick(e) == LinkStatus::Valid)
                .count()
        };
        Self {
            checked: entries.len(),
            nssdc: count(|e| e.nssdc),
            celestrak: count(|e| e.celestrak),
            wikipedia: count(|e| e.wikipedia),
            unknown: entries
                .iter()
                .filter(|e| {
                    [e.nssdc, e.celestrak, e.wikipedia].contains(&LinkStatus::Unknown)
                })
                .count(),
        }
    }
}

/// Opens the store and registers both source fetchers with their configured URLs.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<SatStore> {
    let mut store = SatStore::from_app_config(config)
        .await
        .context("failed to open satstore")?;
    let http = HttpSource::new(&config.network).context("failed to build HTTP client")?;

    let satcat_url = source_url(config, CelestrakFetcher::NAME, SATCAT_URL);
    let ucs_url = source_url(config, UcsFetcher::NAME, UCS_URL);
    let fetchers: [Arc<dyn Fetcher>; 2] = [
        Arc::new(CelestrakFetcher::with_url(http.clone(), satcat_url)),
        Arc::new(UcsFetcher::with_url(http, ucs_url)),
    ];
    for fetcher in fetchers {
        store.register_fetcher(fetcher);
    }
    Ok(store)
}

fn source_url(config: &AppConfig, name: &str, default: &str) -> String {
    config
        .source(name)
        .map(|source| source.url.clone())
        .unwrap_or_else(|| default.to_string())
}

/// Creates the catalog and the configured table of every known source.
pub async fn init(config: &AppConfig) -> anyhow::Result<Vec<String>> {
    let store = open_store(config).await?;
    let mut tables = Vec::new();
    for name in store.fetcher_names() {
        let schema = SCHEMA_REGISTRY.require(name)?;
        let table = config
            .source(name)
            .and_then(|source| source.table.clone())
            .unwrap_or_else(|| schema.default_table.to_string());
        store.catalog.create_table(schema, &table)?;
        tables.push(table);
    }
    info!("Catalog ready at {}", store.config.catalog_path.display());
    Ok(tables)
}

pub async fn ingest(config: &AppConfig, args: &IngestArgs) -> anyhow::Result<IngestReport> {
    let name = args.source.name();
    let source = config.source(name);
    let mode = args
        .mode
        .map(IngestMode::from)
        .or(source.map(|s| s.mode))
        .unwrap_or_default();
    let table = args
        .table
        .clone()
        .or_else(|| source.and_then(|s| s.table.clone()));

    let store = open_store(config).await?;
    let report = match &args.file {
        Some(path) => {
            let bytes = read_file(path).await?;
            let schema = SCHEMA_REGISTRY.require(name)?;
            info!("Ingesting {} ({} bytes) as {}", path.display(), bytes.len(), name);
            store
                .ingest_bytes(schema, table.as_deref(), mode, &bytes)
                .await?
        }
        None => {
            let request = SyncRequest { table, mode };
            store
                .sync(name, request)
                .await
                .with_context(|| format!("sync of '{name}' failed"))?
        }
    };

    info!(
        inserted = report.inserted,
        unchanged = report.unchanged,
        replaced = report.replaced,
        superseded = report.superseded,
        "ingest of {} finished",
        name
    );
    Ok(report)
}

/// Validates reference pages for SATCAT objects and replaces the `links` table.
pub async fn check_links(config: &AppConfig, args: &LinksArgs) -> anyhow::Result<LinksSummary> {
    let store = open_store(config).await?;
    let http = HttpSource::new(&config.network)?;

    let satcat = match &args.file {
        Some(path) => read_file(path).await?,
        None => {
            let url = source_url(config, CelestrakFetcher::NAME, SATCAT_URL);
            http.get_bytes(&url)
                .await
                .with_context(|| format!("failed to download {url}"))?
        }
    };
    let ids = ids_from_satcat(&satcat, args.limit.or(config.links.limit));
    info!("{} satellites found.", ids.len());

    let mut links = config.links.clone();
    if let Some(workers) = args.workers {
        links.workers = workers;
    }
    let checker = LinkChecker::new(http, &links);
    let entries = checker.check_all(ids).await;

    let summary = LinksSummary::from_entries(&entries);
    if summary.unknown > 0 {
        warn!("{} satellites have links that could not be checked", summary.unknown);
    }

    let records: Vec<_> = entries
        .iter()
        .map(|entry| checker.targets().to_record(entry))
        .collect();
    store
        .catalog
        .replace_links(&records)
        .context("failed to save links")?;
    info!("Saved links for {} satellites", records.len());
    Ok(summary)
}

pub async fn runs(config: &AppConfig, limit: usize) -> anyhow::Result<Vec<RunLog>> {
    let store = SatStore::from_app_config(config).await?;
    Ok(store.catalog.list_run_logs(limit)?)
}

async fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}
