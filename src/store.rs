use std::future::Future;

use crate::error::Error;
use crate::record::{KeySchema, Record};

mod dynamo;
pub mod memory;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

/// Largest number of write requests a single `BatchWriteItem` call accepts
pub const BATCH_WRITE_SIZE: usize = 25;

/// One page of a scan
#[must_use = "a scan page carries the continuation token for the next page"]
#[derive(Clone, Debug, Default)]
pub struct ScanPage {
    /// Items on this page
    pub items: Vec<Record>,
    /// Continuation token; `None` when the scan is complete
    pub last_evaluated_key: Option<Record>,
}

/// Kind of mutation a batch write applies to every record in the batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or replace the whole item
    Put,
    /// Delete by primary key; records must contain only key attributes
    Delete,
}

/// Records of a batch the store did not apply
#[must_use = "batch results contain failed records that should be checked"]
#[derive(Clone, Debug, Default)]
pub struct BatchResult {
    /// Records rejected or left unprocessed by the store
    pub failed: Vec<Record>,
}

impl BatchResult {
    /// Result with no failures
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if every record in the batch was applied
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Attribute changes for a single-item update
#[derive(Clone, Debug, Default)]
pub struct ItemUpdate {
    /// Attributes to set
    pub set: Record,
    /// Attributes to remove
    pub remove: Vec<String>,
}

impl ItemUpdate {
    /// Check if the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// Capability to read and mutate tables
///
/// [`DynamoStore`] talks to DynamoDB; [`MemoryStore`] keeps tables in process.
pub trait TableStore {
    /// Fetch one page of `table`, starting after `start`
    fn scan_page(
        &self,
        table: &str,
        start: Option<Record>,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<ScanPage, Error>>;

    /// Count every item in `table` with a count-only scan
    fn count_items(&self, table: &str) -> impl Future<Output = Result<usize, Error>>;

    /// Apply `op` to at most [`BATCH_WRITE_SIZE`] records
    fn batch_write(
        &self,
        table: &str,
        op: WriteOp,
        records: &[Record],
    ) -> impl Future<Output = Result<BatchResult, Error>>;

    /// Get an item by key; `None` if it does not exist
    fn get_item(
        &self,
        table: &str,
        key: Record,
    ) -> impl Future<Output = Result<Option<Record>, Error>>;

    /// Insert or replace an item
    fn put_item(&self, table: &str, item: Record) -> impl Future<Output = Result<(), Error>>;

    /// Update an existing item, returning the new values of the updated attributes
    ///
    /// Fails with [`Error::ItemNotFound`] when no item has `key`; the update never creates one.
    fn update_item(
        &self,
        table: &str,
        key: Record,
        update: ItemUpdate,
    ) -> impl Future<Output = Result<Record, Error>>;

    /// Delete an item, returning its previous attributes if it existed
    fn delete_item(
        &self,
        table: &str,
        key: Record,
    ) -> impl Future<Output = Result<Option<Record>, Error>>;

    /// Read the primary key layout of `table`
    fn describe_key_schema(&self, table: &str) -> impl Future<Output = Result<KeySchema, Error>>;
}
