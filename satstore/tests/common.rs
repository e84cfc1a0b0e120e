use satstore::{SatStore, config::StorageConfig};
use tempfile::TempDir;

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: StorageConfig,
    pub store: SatStore,
}

pub async fn init_test_context() -> anyhow::Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = StorageConfig::new(temp_dir.path());
    let store = SatStore::new(config.clone()).await?;

    Ok(TestContext {
        temp_dir,
        config,
        store,
    })
}

/// A SATCAT line with the designator, catalog number and name at their fixed offsets.
#[allow(dead_code)]
pub fn satcat_line(intl_desg: &str, norad: u32, name: &str) -> String {
    format!(
        "{:<13}{:0>5}   O {:<24}  US     1998-11-20   TYMS                92.87  51.64     422     418",
        intl_desg, norad, name
    )
}

#[allow(dead_code)]
pub fn satcat_file(lines: &[String]) -> Vec<u8> {
    let mut bytes = lines.join("\n").into_bytes();
    bytes.push(b'\n');
    bytes
}
