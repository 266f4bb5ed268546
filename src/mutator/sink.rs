//! Batch destinations for a mutation run

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::error::Error;
use crate::record::Record;
use crate::store::{BatchResult, TableStore, WriteOp};

/// Destination for batches of records
pub trait BatchSink {
    /// Write one batch; never called with more than 25 records
    fn write_batch(&self, records: &[Record]) -> impl Future<Output = Result<BatchResult, Error>>;
}

/// Puts every record into a table
#[derive(Debug)]
pub struct PutSink<'a, S> {
    store: &'a S,
    table: String,
}

impl<'a, S: TableStore> PutSink<'a, S> {
    /// Sink writing to `table`
    pub fn new(store: &'a S, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

impl<S: TableStore> BatchSink for PutSink<'_, S> {
    async fn write_batch(&self, records: &[Record]) -> Result<BatchResult, Error> {
        self.store.batch_write(&self.table, WriteOp::Put, records).await
    }
}

/// Deletes every record from a table; records must be keys
#[derive(Debug)]
pub struct DeleteSink<'a, S> {
    store: &'a S,
    table: String,
}

impl<'a, S: TableStore> DeleteSink<'a, S> {
    /// Sink deleting from `table`
    pub fn new(store: &'a S, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

impl<S: TableStore> BatchSink for DeleteSink<'_, S> {
    async fn write_batch(&self, records: &[Record]) -> Result<BatchResult, Error> {
        self.store
            .batch_write(&self.table, WriteOp::Delete, records)
            .await
    }
}

/// Gathers records in memory
#[derive(Debug, Default)]
pub struct CollectSink {
    records: Mutex<Vec<Record>>,
}

impl CollectSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records gathered so far
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nothing was gathered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the gathered records
    pub fn into_records(self) -> Vec<Record> {
        self.records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl BatchSink for CollectSink {
    async fn write_batch(&self, records: &[Record]) -> Result<BatchResult, Error> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        Ok(BatchResult::ok())
    }
}
