use crate::catalog::{Predicate, TableStore, WriteBatch};
use crate::errors::{Result, StorageError};
use crate::models::{IngestMode, IngestReport, Lookup, Record};
use crate::schema_registry::SchemaDescriptor;
use crate::utils::fingerprint::Fingerprint;
use std::collections::{HashMap, HashSet};

/// Upper bound on the records submitted in one transactional batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Batches with at most this many records get every row logged at debug level.
pub const VERBOSE_BATCH_ROWS: usize = 10;

/// Deduplicating, batched writer for one table.
///
/// Records are processed strictly in input order. Every record is checked against
/// the store by line fingerprint and, when reconciling, by natural key; new rows are
/// collected into batches of at most `batch_size` records that commit as one
/// transaction each.
///
/// When reconciling, only the last record of each natural key in the input is
/// applied, so the outcome does not depend on where batch boundaries fall.
pub struct IngestEngine<'a, S: TableStore + ?Sized> {
    store: &'a S,
    schema: &'static SchemaDescriptor,
    table: String,
    batch_size: usize,
}

/// Position and fingerprint of the last record carrying each natural key.
fn last_per_key(records: &[Record]) -> HashMap<String, (usize, Fingerprint)> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.has_natural_key())
        .map(|(idx, record)| {
            (
                record.natural_key.to_string(),
                (idx, record.line_fingerprint.clone()),
            )
        })
        .collect()
}

impl<'a, S: TableStore + ?Sized> IngestEngine<'a, S> {
    pub fn new(store: &'a S, schema: &'static SchemaDescriptor, table: impl Into<String>) -> Self {
        Self {
            store,
            schema,
            table: table.into(),
            batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Sets the batch size, clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Classifies `record` against the rows already stored.
    pub fn lookup(&self, record: &Record, mode: IngestMode) -> Result<Lookup> {
        let reconcile = mode == IngestMode::ReconcileByKey && record.has_natural_key();
        let stored = self.store.find_one(
            self.schema,
            &self.table,
            &Predicate::fingerprint(&record.line_fingerprint),
        )?;

        let stale_rows = if reconcile {
            self.stale_rows(record)?
        } else {
            Vec::new()
        };

        Ok(match (stored, stale_rows.is_empty()) {
            (Some(_), _) => Lookup::PresentUnchanged { stale_rows },
            (None, false) => Lookup::PresentConflicting { stale_rows },
            (None, true) => Lookup::Absent,
        })
    }

    /// Rows under the record's natural key whose fingerprint differs from the record's.
    fn stale_rows(&self, record: &Record) -> Result<Vec<i64>> {
        let rows = self.store.find_all(
            self.schema,
            &self.table,
            &Predicate::natural_key(self.schema, &record.natural_key),
        )?;
        Ok(rows
            .into_iter()
            .filter(|row| row.line_fingerprint != record.line_fingerprint.as_str())
            .map(|row| row.row_id)
            .collect())
    }

    /// Ingests `records` in order. Earlier batches stay committed when a later
    /// batch fails; the error reports how far the run got.
    pub fn ingest<I>(&self, records: I, mode: IngestMode) -> Result<IngestReport>
    where
        I: IntoIterator<Item = Record>,
    {
        if !self.store.table_exists(&self.table)? {
            self.store.create_table(self.schema, &self.table)?;
        }

        let records: Vec<Record> = records.into_iter().collect();
        let last_for_key = match mode {
            IngestMode::ReconcileByKey => last_per_key(&records),
            IngestMode::AppendOnly => HashMap::new(),
        };

        let mut report = IngestReport {
            seen: records.len(),
            ..IngestReport::default()
        };
        let mut seen: HashSet<Fingerprint> = HashSet::new();
        let mut batch = WriteBatch::default();

        for (idx, record) in records.into_iter().enumerate() {
            let latest = if record.has_natural_key() {
                last_for_key.get(&record.natural_key.to_string())
            } else {
                None
            };
            match latest {
                Some((last, _)) if *last == idx => {}
                Some((_, last_fingerprint)) => {
                    if *last_fingerprint == record.line_fingerprint {
                        report.duplicates += 1;
                    } else {
                        log::debug!(
                            "{} {} appears again later in the input, skipping line {}.",
                            self.schema.natural_key,
                            record.natural_key,
                            idx
                        );
                        report.replaced += 1;
                    }
                    continue;
                }
                None => {
                    if !seen.insert(record.line_fingerprint.clone()) {
                        report.duplicates += 1;
                        continue;
                    }
                }
            }

            match self.lookup(&record, mode)? {
                Lookup::Absent => batch.inserts.push(record),
                Lookup::PresentUnchanged { stale_rows } => {
                    report.unchanged += 1;
                    if !stale_rows.is_empty() {
                        log::info!(
                            "Pruning {} stale row(s) of {} {} in '{}'.",
                            stale_rows.len(),
                            self.schema.natural_key,
                            record.natural_key,
                            self.table
                        );
                        batch.deletes.extend(stale_rows);
                    }
                }
                Lookup::PresentConflicting { stale_rows } => {
                    log::info!(
                        "Superseding {} {} in '{}' (rows {:?}).",
                        self.schema.natural_key,
                        record.natural_key,
                        self.table,
                        stale_rows
                    );
                    batch.deletes.extend(stale_rows);
                    batch.inserts.push(record);
                }
            }

            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut report)?;
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch, &mut report)?;
        }
        self.store.commit()?;

        log::info!(
            "Ingested into '{}' ({}): {} seen, {} inserted, {} unchanged, {} duplicates, {} replaced, {} superseded, {} batches.",
            self.table,
            mode,
            report.seen,
            report.inserted,
            report.unchanged,
            report.duplicates,
            report.replaced,
            report.superseded,
            report.batches
        );
        Ok(report)
    }

    fn flush(&self, pending: &mut WriteBatch, report: &mut IngestReport) -> Result<()> {
        let batch = std::mem::take(pending);
        let index = report.batches;

        if batch.len() <= VERBOSE_BATCH_ROWS {
            for record in &batch.inserts {
                log::debug!(
                    "Batch {} row {}={} fingerprint={}",
                    index,
                    self.schema.natural_key,
                    record.natural_key,
                    record.line_fingerprint
                );
            }
        }

        if let Err(e) = self.store.execute_batch(self.schema, &self.table, &batch) {
            log::error!(
                "Batch {} into '{}' failed after {} committed rows: {}",
                index,
                self.table,
                report.inserted,
                e
            );
            return Err(StorageError::BatchCommit {
                batch: index,
                committed_rows: report.inserted,
                source: Box::new(e),
            });
        }

        report.inserted += batch.len();
        report.superseded += batch.deletes.len();
        report.batches += 1;
        log::debug!(
            "Committed batch {} into '{}': {} inserts, {} deletes.",
            index,
            self.table,
            batch.len(),
            batch.deletes.len()
        );
        Ok(())
    }
}
