//! Paginated record sources
//!
//! A [`PageSource`] hands out pages together with an opaque continuation token; the run
//! passes the token back unchanged to fetch the next page.

use std::fmt;
use std::future::Future;

use crate::error::Error;
use crate::record::Record;
use crate::store::TableStore;

/// One page delivered by a [`PageSource`]
#[derive(Debug)]
pub struct Page<T> {
    /// Decoded records
    pub records: Vec<Record>,
    /// Per-record decode errors, handled by the record error policy
    pub rejected: Vec<Error>,
    /// Token for the next page; `None` when the source is exhausted
    pub next_token: Option<T>,
}

impl<T> Page<T> {
    /// Page of records with no decode errors
    pub fn new(records: Vec<Record>, next_token: Option<T>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
            next_token,
        }
    }

    /// Empty final page
    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }
}

/// Paginated supplier of records
pub trait PageSource {
    /// Opaque continuation value passed back to fetch the following page
    type Token: Clone + fmt::Debug;

    /// Fetch the page after `token` (the first page for `None`), at most `limit` records
    fn fetch_page(
        &mut self,
        token: Option<Self::Token>,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Page<Self::Token>, Error>>;
}

/// Scans a table page by page
///
/// The token is the scan's `LastEvaluatedKey`, passed back unchanged as `ExclusiveStartKey`.
#[derive(Debug)]
pub struct TableSource<'a, S> {
    store: &'a S,
    table: String,
}

impl<'a, S: TableStore> TableSource<'a, S> {
    /// Source over every item of `table`
    pub fn new(store: &'a S, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Name of the scanned table
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl<S: TableStore> PageSource for TableSource<'_, S> {
    type Token = Record;

    async fn fetch_page(
        &mut self,
        token: Option<Record>,
        limit: Option<usize>,
    ) -> Result<Page<Record>, Error> {
        let page = self.store.scan_page(&self.table, token, limit).await?;
        Ok(Page::new(page.items, page.last_evaluated_key))
    }
}
