//! In-process table store
//!
//! [`MemoryStore`] keeps tables in ordered maps behind a mutex. It pages, counts and batches
//! the way DynamoDB does, which makes it the store used by the test suite and by dry runs.
//! Throttling and per-record rejection can be injected to exercise failure paths.

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BatchResult, ItemUpdate, ScanPage, TableStore, WriteOp};
use crate::error::Error;
use crate::record::{KeySchema, Record, describe_key};

/// Page size used when a scan does not pass a limit
pub const DEFAULT_PAGE_SIZE: usize = 100;

type RejectFn = Box<dyn Fn(&Record) -> bool + Send + Sync>;

/// A `batch_write` call observed by the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteCall {
    /// Target table
    pub table: String,
    /// Write kind
    pub op: WriteOp,
    /// Number of records submitted
    pub len: usize,
}

struct MemoryTable {
    schema: KeySchema,
    items: BTreeMap<String, Record>,
}

impl MemoryTable {
    fn encode_key(&self, record: &Record) -> Result<String, Error> {
        self.schema.key_identity(record).ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "record is missing key attribute(s) {}",
                self.schema.missing_in(record).join(", ")
            ))
        })
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    page_size: Option<usize>,
    throttled_writes: usize,
    throttled_scans: usize,
    reject: Option<RejectFn>,
    write_calls: Vec<WriteCall>,
}

impl State {
    fn table(&self, name: &str) -> Result<&MemoryTable, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, Error> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }
}

/// In-memory [`TableStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        let mut tables: Vec<(&String, usize)> = state
            .tables
            .iter()
            .map(|(name, table)| (name, table.items.len()))
            .collect();
        tables.sort();
        f.debug_struct("MemoryStore")
            .field("tables", &tables)
            .field("write_calls", &state.write_calls.len())
            .finish()
    }
}

impl MemoryStore {
    /// Empty store with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty table, builder style
    pub fn with_table(self, name: &str, schema: KeySchema) -> Self {
        self.create_table(name, schema);
        self
    }

    /// Override the default scan page size
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = Some(page_size.max(1));
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty table; an existing table with that name is left untouched
    pub fn create_table(&self, name: &str, schema: KeySchema) {
        let _ = self
            .lock()
            .tables
            .entry(name.to_string())
            .or_insert_with(|| MemoryTable {
                schema,
                items: BTreeMap::new(),
            });
    }

    /// Seed `table` with `records` without going through `batch_write`
    pub fn insert(
        &self,
        table: &str,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<(), Error> {
        let mut state = self.lock();
        let table = state.table_mut(table)?;
        for record in records {
            let key = table.encode_key(&record)?;
            let _ = table.items.insert(key, record);
        }
        Ok(())
    }

    /// All items of `table` in key order; empty if the table does not exist
    pub fn items(&self, table: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of items in `table`
    pub fn len(&self, table: &str) -> usize {
        self.lock()
            .tables
            .get(table)
            .map_or(0, |t| t.items.len())
    }

    /// Check if `table` holds no items
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Fail the next `count` batch writes with [`Error::Throttled`]
    pub fn throttle_next_writes(&self, count: usize) {
        self.lock().throttled_writes = count;
    }

    /// Fail the next `count` scans with [`Error::Throttled`]
    pub fn throttle_next_scans(&self, count: usize) {
        self.lock().throttled_scans = count;
    }

    /// Leave records matching `predicate` unprocessed in every batch write
    pub fn reject_when(&self, predicate: impl Fn(&Record) -> bool + Send + Sync + 'static) {
        self.lock().reject = Some(Box::new(predicate));
    }

    /// Batch writes issued so far, in order
    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.lock().write_calls.clone()
    }
}

impl TableStore for MemoryStore {
    async fn scan_page(
        &self,
        table: &str,
        start: Option<Record>,
        limit: Option<usize>,
    ) -> Result<ScanPage, Error> {
        let mut state = self.lock();
        if state.throttled_scans > 0 {
            state.throttled_scans -= 1;
            return Err(Error::Throttled {
                table: table.to_string(),
                message: "scan throttled".to_string(),
            });
        }

        let page_size = limit
            .or(state.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .max(1);
        let memory_table = state.table(table)?;

        let lower = match &start {
            Some(key) => Bound::Excluded(memory_table.encode_key(key)?),
            None => Bound::Unbounded,
        };
        let mut remaining = memory_table.items.range((lower, Bound::Unbounded));

        let items: Vec<Record> = remaining
            .by_ref()
            .take(page_size)
            .map(|(_, item)| item.clone())
            .collect();

        let last_evaluated_key = match (items.last(), remaining.next()) {
            (Some(last), Some(_)) => Some(memory_table.schema.key_of(last)?),
            _ => None,
        };

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn count_items(&self, table: &str) -> Result<usize, Error> {
        Ok(self.lock().table(table)?.items.len())
    }

    async fn batch_write(
        &self,
        table: &str,
        op: WriteOp,
        records: &[Record],
    ) -> Result<BatchResult, Error> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let memory_table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;

        state.write_calls.push(WriteCall {
            table: table.to_string(),
            op,
            len: records.len(),
        });

        if state.throttled_writes > 0 {
            state.throttled_writes -= 1;
            return Err(Error::Throttled {
                table: table.to_string(),
                message: "batch write throttled".to_string(),
            });
        }

        // A record without its key or a repeated key fails the whole batch, as the service does.
        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            let key = memory_table
                .encode_key(record)
                .map_err(|e| Error::BatchRejected {
                    table: table.to_string(),
                    message: e.to_string(),
                })?;
            keyed.push((key, record));
        }
        let mut seen = HashSet::with_capacity(keyed.len());
        if !keyed.iter().all(|(key, _)| seen.insert(key.as_str())) {
            return Err(Error::BatchRejected {
                table: table.to_string(),
                message: "Provided list of item keys contains duplicates".to_string(),
            });
        }

        let mut result = BatchResult::ok();
        for (key, record) in keyed {
            if state.reject.as_ref().is_some_and(|reject| reject(record)) {
                result.failed.push(record.clone());
                continue;
            }
            match op {
                WriteOp::Put => {
                    let _ = memory_table.items.insert(key, record.clone());
                }
                WriteOp::Delete => {
                    let _ = memory_table.items.remove(&key);
                }
            }
        }

        Ok(result)
    }

    async fn get_item(&self, table: &str, key: Record) -> Result<Option<Record>, Error> {
        let state = self.lock();
        let memory_table = state.table(table)?;
        let encoded = memory_table.encode_key(&key)?;
        Ok(memory_table.items.get(&encoded).cloned())
    }

    async fn put_item(&self, table: &str, item: Record) -> Result<(), Error> {
        let mut state = self.lock();
        let memory_table = state.table_mut(table)?;
        let encoded = memory_table.encode_key(&item)?;
        let _ = memory_table.items.insert(encoded, item);
        Ok(())
    }

    async fn update_item(
        &self,
        table: &str,
        key: Record,
        update: ItemUpdate,
    ) -> Result<Record, Error> {
        let mut state = self.lock();
        let memory_table = state.table_mut(table)?;
        let encoded = memory_table.encode_key(&key)?;

        for name in update.set.keys().chain(update.remove.iter()) {
            if memory_table.schema.contains(name) {
                return Err(Error::SchemaMismatch(format!(
                    "cannot update key attribute '{}' of item {}",
                    name,
                    describe_key(&key)
                )));
            }
        }

        let item = memory_table
            .items
            .get_mut(&encoded)
            .ok_or_else(|| Error::ItemNotFound {
                table: table.to_string(),
                key: describe_key(&key),
            })?;
        for name in &update.remove {
            let _ = item.remove(name);
        }
        let mut updated: HashMap<String, AttributeValue> = HashMap::with_capacity(update.set.len());
        for (name, value) in update.set {
            let _ = item.insert(name.clone(), value.clone());
            let _ = updated.insert(name, value);
        }

        Ok(updated)
    }

    async fn delete_item(&self, table: &str, key: Record) -> Result<Option<Record>, Error> {
        let mut state = self.lock();
        let memory_table = state.table_mut(table)?;
        let encoded = memory_table.encode_key(&key)?;
        Ok(memory_table.items.remove(&encoded))
    }

    async fn describe_key_schema(&self, table: &str) -> Result<KeySchema, Error> {
        Ok(self.lock().table(table)?.schema.clone())
    }
}
