use crate::config::StorageConfig;
use crate::errors::{Result, StorageError};
use crate::models::{LinkRecord, Record, RunLog, StoredRow, Value};
use crate::schema_registry::SchemaDescriptor;
use crate::utils::fingerprint::Fingerprint;
use rusqlite::{Connection, Params, params, params_from_iter};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub value: Value,
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }

    pub fn fingerprint(fp: &Fingerprint) -> Self {
        Self::eq("line_fingerprint", Value::Text(fp.as_str().to_string()))
    }

    pub fn natural_key(schema: &SchemaDescriptor, key: &Value) -> Self {
        Self::eq(schema.natural_key, key.clone())
    }
}

/// Writes submitted together in one transaction: superseded row ids to delete and
/// records to insert.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub deletes: Vec<i64>,
    pub inserts: Vec<Record>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.inserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// The relational store the ingestion engine writes through.
pub trait TableStore: Send + Sync {
    fn table_exists(&self, table: &str) -> Result<bool>;

    fn create_table(&self, schema: &SchemaDescriptor, table: &str) -> Result<()>;

    fn find_one(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        predicate: &Predicate,
    ) -> Result<Option<StoredRow>> {
        Ok(self.find_all(schema, table, predicate)?.into_iter().next())
    }

    fn find_all(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        predicate: &Predicate,
    ) -> Result<Vec<StoredRow>>;

    /// Applies all writes of `batch` atomically. Nothing is applied on error.
    fn execute_batch(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        batch: &WriteBatch,
    ) -> Result<()>;

    fn count_rows(&self, table: &str) -> Result<i64>;

    /// Batches commit on their own. Stores buffering writes flush here.
    fn commit(&self) -> Result<()> {
        Ok(())
    }
}

pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = config.catalog_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.catalog_path)
            .map_err(|e| StorageError::StoreUnavailable(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::StoreUnavailable("catalog connection poisoned".to_string()))
    }

    /// Creates the bookkeeping tables (run log, link checker output).
    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS import_runs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                table_name TEXT NOT NULL,
                mode TEXT NOT NULL,
                file_fingerprint CHAR(32),
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT,
                details TEXT
            );
            CREATE TABLE IF NOT EXISTS links (
                obj_no VARCHAR(20) NOT NULL,
                nssdc VARCHAR(128),
                celestrak VARCHAR(128),
                wikipedia VARCHAR(128)
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Latest rows of a catalog table, newest first.
    pub fn list_rows(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        limit: usize,
    ) -> Result<Vec<StoredRow>> {
        let table = quote_ident(table)?;
        let id = quote_ident(schema.id_column)?;
        let sql = format!("SELECT * FROM {table} ORDER BY {id} DESC LIMIT ?1");
        let conn = self.conn()?;
        query_rows(&conn, schema, &sql, params![limit as i64])
    }

    pub fn create_run_log(
        &self,
        source: &str,
        table: &str,
        mode: &str,
        file_fingerprint: Option<&Fingerprint>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let start_time = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO import_runs (source, table_name, mode, file_fingerprint, start_time, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'RUNNING')",
            params![
                source,
                table,
                mode,
                file_fingerprint.map(|fp| fp.as_str()),
                start_time
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finish_run_log(&self, run_id: i64, status: &str, details: &str) -> Result<()> {
        let conn = self.conn()?;
        let end_time = chrono::Utc::now().timestamp();
        conn.execute(
            "UPDATE import_runs SET status = ?1, details = ?2, end_time = ?3 WHERE run_id = ?4",
            params![status, details, end_time, run_id],
        )?;
        Ok(())
    }

    pub fn list_run_logs(&self, limit: usize) -> Result<Vec<RunLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, source, table_name, mode, file_fingerprint, start_time, end_time, status, details
             FROM import_runs ORDER BY run_id DESC LIMIT ?1",
        )?;
        let logs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunLog {
                    run_id: row.get(0)?,
                    source: row.get(1)?,
                    table_name: row.get(2)?,
                    mode: row.get(3)?,
                    file_fingerprint: row.get(4)?,
                    start_time: row.get(5)?,
                    end_time: row.get(6)?,
                    status: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    details: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    /// Replaces the whole `links` table in a single transaction.
    pub fn replace_links(&self, links: &[LinkRecord]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM links", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO links (obj_no, nssdc, celestrak, wikipedia) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in links {
                stmt.execute(params![link.obj_no, link.nssdc, link.celestrak, link.wikipedia])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_links(&self) -> Result<Vec<LinkRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT obj_no, nssdc, celestrak, wikipedia FROM links ORDER BY obj_no")?;
        let links = stmt
            .query_map([], |row| {
                Ok(LinkRecord {
                    obj_no: row.get(0)?,
                    nssdc: row.get(1)?,
                    celestrak: row.get(2)?,
                    wikipedia: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }
}

impl TableStore for Catalog {
    fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&self, schema: &SchemaDescriptor, table: &str) -> Result<()> {
        let ddl = table_ddl(schema, table)?;
        let conn = self.conn()?;
        conn.execute_batch(&ddl)?;
        log::info!("Ensured table '{}' for schema '{}'.", table, schema.name);
        Ok(())
    }

    fn find_all(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        predicate: &Predicate,
    ) -> Result<Vec<StoredRow>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 ORDER BY {}",
            quote_ident(table)?,
            quote_ident(&predicate.column)?,
            quote_ident(schema.id_column)?
        );
        let conn = self.conn()?;
        query_rows(&conn, schema, &sql, params![predicate.value])
    }

    fn execute_batch(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        batch: &WriteBatch,
    ) -> Result<()> {
        let quoted_table = quote_ident(table)?;
        let delete_sql = format!(
            "DELETE FROM {quoted_table} WHERE {} = ?1",
            quote_ident(schema.id_column)?
        );

        let mut columns: Vec<String> = schema
            .field_names()
            .map(quote_ident)
            .collect::<Result<Vec<_>>>()?;
        columns.push(quote_ident("line_fingerprint")?);
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let insert_sql = format!(
            "INSERT INTO {quoted_table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut delete = tx.prepare(&delete_sql)?;
            for row_id in &batch.deletes {
                delete.execute(params![row_id])?;
            }

            let mut insert = tx.prepare(&insert_sql)?;
            for record in &batch.inserts {
                let mut values: Vec<Value> = schema
                    .field_names()
                    .map(|name| record.get(name).cloned().unwrap_or(Value::Null))
                    .collect();
                values.push(Value::Text(record.line_fingerprint.as_str().to_string()));
                insert.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        let conn = self.conn()?;
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

/// `CREATE TABLE` plus fingerprint and natural key indexes for `schema` under `table`.
pub fn table_ddl(schema: &SchemaDescriptor, table: &str) -> Result<String> {
    let quoted = quote_ident(table)?;
    let mut columns = vec![format!(
        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
        quote_ident(schema.id_column)?
    )];
    for field in schema.fields {
        columns.push(format!("{} {}", quote_ident(field.name)?, field.kind.sql_type()));
    }
    columns.push("\"line_fingerprint\" CHAR(32) NOT NULL".to_string());
    columns.push("\"import_timestamp\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string());

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {quoted} (\n    {}\n);\n\
         CREATE INDEX IF NOT EXISTS {} ON {quoted} (\"line_fingerprint\");\n\
         CREATE INDEX IF NOT EXISTS {} ON {quoted} ({});",
        columns.join(",\n    "),
        quote_ident(&format!("{table}_line_fingerprint_idx"))?,
        quote_ident(&format!("{table}_{}_idx", schema.natural_key))?,
        quote_ident(schema.natural_key)?,
    ))
}

/// Table and column names end up inside SQL text, so only plain identifiers pass.
fn quote_ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(format!("\"{name}\""))
    } else {
        Err(StorageError::InvalidArg(format!("invalid identifier '{name}'")))
    }
}

fn query_rows<P: Params>(
    conn: &Connection,
    schema: &SchemaDescriptor,
    sql: &str,
    params: P,
) -> Result<Vec<StoredRow>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map(params, |row| {
            let mut stored = StoredRow {
                row_id: 0,
                line_fingerprint: String::new(),
                import_timestamp: String::new(),
                fields: BTreeMap::new(),
            };
            for (idx, name) in columns.iter().enumerate() {
                match name.as_str() {
                    n if n == schema.id_column => stored.row_id = row.get(idx)?,
                    "line_fingerprint" => stored.line_fingerprint = row.get(idx)?,
                    "import_timestamp" => stored.import_timestamp = row.get(idx)?,
                    _ => {
                        let value = Value::from_sql_ref(row.get_ref(idx)?, schema.is_date_column(name));
                        stored.fields.insert(name.clone(), value);
                    }
                }
            }
            Ok(stored)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::normalize::NumericFallback;
    use crate::schema_registry::{SATCAT, UCS};
    use crate::utils::fingerprint::fingerprint;
    use tempfile::tempdir;

    fn setup() -> (Catalog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let catalog = Catalog::new(&config).unwrap();
        catalog.initialize_schema().unwrap();
        (catalog, dir)
    }

    fn satcat_record(norad: &str, name: &str) -> Record {
        let line = format!("1998-067A    {norad:0>5}   O {name:<24}");
        SATCAT.parse_line(line.as_bytes(), NumericFallback::Null).unwrap()
    }

    #[test]
    fn test_create_table_and_exists() {
        let (catalog, _dir) = setup();
        assert!(!catalog.table_exists("celestrak_satcat").unwrap());
        catalog.create_table(&SATCAT, "celestrak_satcat").unwrap();
        // second call is a no-op
        catalog.create_table(&SATCAT, "celestrak_satcat").unwrap();
        assert!(catalog.table_exists("celestrak_satcat").unwrap());
        assert_eq!(catalog.count_rows("celestrak_satcat").unwrap(), 0);

        let tables = catalog.list_tables().unwrap();
        assert!(tables.contains(&"import_runs".to_string()));
        assert!(tables.contains(&"links".to_string()));
    }

    #[test]
    fn test_execute_batch_and_find() {
        let (catalog, _dir) = setup();
        catalog.create_table(&SATCAT, "celestrak_satcat").unwrap();

        let iss = satcat_record("25544", "ISS (ZARYA)");
        let batch = WriteBatch {
            deletes: vec![],
            inserts: vec![iss.clone(), satcat_record("20580", "HST")],
        };
        catalog.execute_batch(&SATCAT, "celestrak_satcat", &batch).unwrap();
        assert_eq!(catalog.count_rows("celestrak_satcat").unwrap(), 2);

        let found = catalog
            .find_one(&SATCAT, "celestrak_satcat", &Predicate::fingerprint(&iss.line_fingerprint))
            .unwrap()
            .unwrap();
        assert_eq!(found.line_fingerprint, iss.line_fingerprint.as_str());
        assert_eq!(found.fields.get("norad_num"), Some(&Value::Integer(25544)));
        assert_eq!(found.fields.get("name"), Some(&Value::Text("ISS (ZARYA)".into())));
        assert!(!found.import_timestamp.is_empty());

        let by_key = catalog
            .find_all(
                &SATCAT,
                "celestrak_satcat",
                &Predicate::natural_key(&SATCAT, &Value::Integer(20580)),
            )
            .unwrap();
        assert_eq!(by_key.len(), 1);

        let missing = catalog
            .find_one(&SATCAT, "celestrak_satcat", &Predicate::fingerprint(&fingerprint(b"nope")))
            .unwrap();
        assert!(missing.is_none());

        let delete = WriteBatch {
            deletes: vec![found.row_id],
            inserts: vec![],
        };
        catalog.execute_batch(&SATCAT, "celestrak_satcat", &delete).unwrap();
        assert_eq!(catalog.count_rows("celestrak_satcat").unwrap(), 1);
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let (catalog, _dir) = setup();
        // the table is missing the UCS columns, so every insert fails
        catalog.create_table(&SATCAT, "celestrak_satcat").unwrap();
        catalog
            .execute_batch(
                &SATCAT,
                "celestrak_satcat",
                &WriteBatch {
                    deletes: vec![],
                    inserts: vec![satcat_record("00005", "VANGUARD 1")],
                },
            )
            .unwrap();
        let keep = catalog
            .find_one(&SATCAT, "celestrak_satcat", &Predicate::natural_key(&SATCAT, &Value::Integer(5)))
            .unwrap()
            .unwrap();

        let ucs_record = UCS
            .parse(b"header\nISS\tUSA\n", NumericFallback::Null)
            .remove(0);
        let bad = WriteBatch {
            deletes: vec![keep.row_id],
            inserts: vec![ucs_record],
        };
        assert!(catalog.execute_batch(&UCS, "celestrak_satcat", &bad).is_err());
        assert_eq!(catalog.count_rows("celestrak_satcat").unwrap(), 1);
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let (catalog, _dir) = setup();
        let result = catalog.create_table(&SATCAT, "satcat; DROP TABLE links");
        assert!(matches!(result, Err(StorageError::InvalidArg(_))));
    }

    #[test]
    fn test_run_log_crud() {
        let (catalog, _dir) = setup();

        let fp = fingerprint(b"file");
        let run_id = catalog
            .create_run_log("satcat", "celestrak_satcat", "append-only", Some(&fp))
            .unwrap();
        assert_eq!(run_id, 1);

        catalog.finish_run_log(run_id, "SUCCESS", "{\"inserted\":2}").unwrap();
        let logs = catalog.list_run_logs(10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "SUCCESS");
        assert_eq!(logs[0].file_fingerprint.as_deref(), Some(fp.as_str()));
        assert!(logs[0].end_time.is_some());
    }

    #[test]
    fn test_replace_links() {
        let (catalog, _dir) = setup();
        let first = vec![LinkRecord {
            obj_no: "1957-001A".to_string(),
            nssdc: None,
            celestrak: Some("https://celestrak.org/satcat/1957/1957-001.php".to_string()),
            wikipedia: None,
        }];
        catalog.replace_links(&first).unwrap();
        assert_eq!(catalog.list_links().unwrap(), first);

        catalog.replace_links(&[]).unwrap();
        assert!(catalog.list_links().unwrap().is_empty());
    }
}
