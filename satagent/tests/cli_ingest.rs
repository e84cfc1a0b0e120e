use satagent::{IngestArgs, LinksArgs, ModeArg, SourceArg};
use satstore::{
    catalog::TableStore,
    config::{AppConfig, StorageConfig},
    models::IngestMode,
};
use tempfile::tempdir;

const SATCAT: &str = "\
1957-001A    00001   D SL-1 R/B                  CIS    1957-10-04   TYMS  1957-12-01    96.19  65.10     938     214   20.4200
1957-001B    00002  *D SPUTNIK 1                 CIS    1957-10-04   TYMS  1958-01-03    96.10  65.00    1080      64
";

fn config_for(dir: &tempfile::TempDir) -> anyhow::Result<AppConfig> {
    let text = format!(
        r#"
[database]
base_path = "{}"

[ingest]
batch_size = 50

[sources.satcat]
url = "http://127.0.0.1:9/satcat.txt"
table = "satcat_history"
mode = "append-only"
"#,
        dir.path().display()
    );
    Ok(AppConfig::from_toml_str(&text)?)
}

#[tokio::test]
async fn init_creates_configured_tables() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = config_for(&dir)?;

    let tables = satagent::init(&config).await?;
    assert_eq!(tables, vec!["satcat_history".to_string(), "ucs_satdb".to_string()]);

    let store = satagent::open_store(&config).await?;
    assert!(store.catalog.table_exists("satcat_history")?);
    assert!(store.catalog.table_exists("ucs_satdb")?);
    assert!(StorageConfig::new(dir.path()).catalog_path.exists());
    Ok(())
}

#[tokio::test]
async fn ingest_local_file_twice_is_idempotent() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = config_for(&dir)?;
    let file = dir.path().join("satcat.txt");
    tokio::fs::write(&file, SATCAT).await?;

    let args = IngestArgs {
        source: SourceArg::Satcat,
        file: Some(file),
        mode: None,
        table: None,
    };
    let first = satagent::ingest(&config, &args).await?;
    assert_eq!(first.inserted, 2);

    let second = satagent::ingest(&config, &args).await?;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.unchanged, 2);

    let runs = satagent::runs(&config, 10).await?;
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.status == "SUCCESS"));
    assert!(runs.iter().all(|run| run.table_name == "satcat_history"));
    assert!(runs.iter().all(|run| run.mode == IngestMode::AppendOnly.as_str()));
    Ok(())
}

#[tokio::test]
async fn mode_and_table_flags_override_config() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = config_for(&dir)?;
    let file = dir.path().join("satcat.txt");
    tokio::fs::write(&file, SATCAT).await?;

    let args = IngestArgs {
        source: SourceArg::Satcat,
        file: Some(file),
        mode: Some(ModeArg::Reconcile),
        table: Some("satcat_current".to_string()),
    };
    let report = satagent::ingest(&config, &args).await?;
    assert_eq!(report.inserted, 2);

    let runs = satagent::runs(&config, 1).await?;
    assert_eq!(runs[0].table_name, "satcat_current");
    assert_eq!(runs[0].mode, "reconcile-by-key");
    Ok(())
}

#[tokio::test]
async fn download_failure_is_reported() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut config = config_for(&dir)?;
    config.network.max_attempts = 1;
    config.network.timeout_secs = 2;

    let args = IngestArgs {
        source: SourceArg::Satcat,
        file: None,
        mode: None,
        table: None,
    };
    let err = satagent::ingest(&config, &args).await.unwrap_err();
    assert!(format!("{err:#}").contains("sync of 'satcat' failed"));
    Ok(())
}

#[tokio::test]
async fn links_with_zero_limit_clears_table() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = config_for(&dir)?;
    let file = dir.path().join("satcat.txt");
    tokio::fs::write(&file, SATCAT).await?;

    let args = LinksArgs {
        file: Some(file),
        limit: Some(0),
        workers: Some(1),
    };
    let summary = satagent::check_links(&config, &args).await?;
    assert_eq!(summary.checked, 0);

    let store = satagent::open_store(&config).await?;
    assert!(store.catalog.list_links()?.is_empty());
    Ok(())
}
