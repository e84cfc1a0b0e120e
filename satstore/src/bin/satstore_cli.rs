use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use satstore::SatStore;
use satstore::catalog::{Predicate, TableStore};
use satstore::config::{BASE_PATH_ENV, StorageConfig};
use satstore::models::{StoredRow, Value};
use satstore::schema_registry::SCHEMA_REGISTRY;

#[derive(Parser, Debug)]
#[command(
    name = "satstore-cli",
    about = "Inspect catalog tables and import runs of a satstore deployment."
)]
struct Cli {
    /// Base path of the satstore instance (directory containing satcat.sqlite and lake/).
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    base_path: PathBuf,

    /// Minimum log level to display.
    #[arg(long, default_value_t = LogLevelArg::Info, value_enum)]
    log_level: LogLevelArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List catalog tables with their row counts.
    Tables,
    /// Display the latest rows of a catalog table.
    Show {
        /// Table name, e.g. celestrak_satcat or ucs_satdb.
        table: String,

        /// Schema of the table when it is not a default table (satcat or ucs).
        #[arg(long)]
        schema: Option<String>,

        /// Only show rows for this NORAD catalog number.
        #[arg(long)]
        norad: Option<i64>,

        /// Maximum number of rows to display.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print the import run log.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Emit JSON instead of a textual table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Error => LevelFilter::Error,
            LogLevelArg::Warn => LevelFilter::Warn,
            LogLevelArg::Info => LevelFilter::Info,
            LogLevelArg::Debug => LevelFilter::Debug,
            LogLevelArg::Trace => LevelFilter::Trace,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default());
    logger.filter_level(LevelFilter::from(cli.log_level));
    let _ = logger.try_init();

    let base_hint = if cli.base_path == PathBuf::from(".") {
        std::env::var(BASE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| cli.base_path.clone())
    } else {
        cli.base_path.clone()
    };

    let base_path = if base_hint.is_absolute() {
        base_hint
    } else {
        std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(&base_hint)
    };

    if !base_path.exists() {
        bail!("Base path '{}' does not exist", base_path.display());
    }

    let storage = SatStore::new(StorageConfig::new(base_path))
        .await
        .context("failed to open satstore instance")?;

    match cli.command {
        Commands::Tables => handle_tables(&storage),
        Commands::Show {
            table,
            schema,
            norad,
            limit,
            json,
        } => handle_show(&storage, &table, schema.as_deref(), norad, limit, json),
        Commands::Runs { limit, json } => handle_runs(&storage, limit, json),
    }
}

fn handle_tables(storage: &SatStore) -> Result<()> {
    let tables = storage
        .catalog
        .list_tables()
        .context("failed to enumerate catalog tables")?;

    println!("{:<32} {:>10}", "TABLE", "ROWS");
    println!("{}", "-".repeat(43));
    for table in tables {
        let rows = storage
            .catalog
            .count_rows(&table)
            .with_context(|| format!("failed to count rows for '{table}'"))?;
        println!("{:<32} {:>10}", table, rows);
    }
    Ok(())
}

fn handle_show(
    storage: &SatStore,
    table: &str,
    schema: Option<&str>,
    norad: Option<i64>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let schema = match schema {
        Some(name) => SCHEMA_REGISTRY.require(name)?,
        None => SCHEMA_REGISTRY.for_table(table).with_context(|| {
            format!("cannot infer the schema of '{table}', pass --schema")
        })?,
    };

    if !storage.catalog.table_exists(table)? {
        println!("Table '{}' does not exist yet.", table);
        return Ok(());
    }

    let mut rows = match norad {
        Some(norad) => storage.catalog.find_all(
            schema,
            table,
            &Predicate::natural_key(schema, &Value::Integer(norad)),
        )?,
        None => storage.catalog.list_rows(schema, table, limit)?,
    };
    rows.truncate(limit);

    if rows.is_empty() {
        println!("No rows matched in '{}'.", table);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        print_row(schema.id_column, row);
    }
    Ok(())
}

fn print_row(id_column: &str, row: &StoredRow) {
    println!(
        "{} = {}  fingerprint={}  imported={}",
        id_column, row.row_id, row.line_fingerprint, row.import_timestamp
    );
    for (name, value) in &row.fields {
        if !value.is_null() {
            println!("    {:<26} {}", name, value);
        }
    }
}

fn handle_runs(storage: &SatStore, limit: usize, json: bool) -> Result<()> {
    let runs = storage
        .catalog
        .list_run_logs(limit)
        .context("failed to load import runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No import runs recorded.");
        return Ok(());
    }

    println!(
        "{:<6} {:<10} {:<20} {:<18} {:<9} {}",
        "RUN", "SOURCE", "TABLE", "MODE", "STATUS", "DETAILS"
    );
    println!("{}", "-".repeat(100));
    for run in runs {
        println!(
            "{:<6} {:<10} {:<20} {:<18} {:<9} {}",
            run.run_id, run.source, run.table_name, run.mode, run.status, run.details
        );
    }
    Ok(())
}
