use ::csv::{ErrorKind, Reader, ReaderBuilder, StringRecord, Writer};
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

use super::DEFAULT_FILE_PAGE_SIZE;
use crate::error::Error;
use crate::mutator::{BatchSink, Page, PageSource};
use crate::record::{Record, ValueType, render_scalar};
use crate::store::BatchResult;

/// Reads records from a CSV file with a header row
///
/// Every non-empty field becomes a string attribute unless a type hint names its column.
/// Rows with the wrong number of fields or with values that do not parse as their hinted
/// type are rejected; I/O errors end the run.
pub struct CsvSource<R> {
    reader: Reader<R>,
    headers: Vec<String>,
    hints: HashMap<String, ValueType>,
    rows_read: usize,
}

impl<R> fmt::Debug for CsvSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvSource")
            .field("headers", &self.headers)
            .field("hints", &self.hints)
            .field("rows_read", &self.rows_read)
            .finish()
    }
}

impl CsvSource<File> {
    /// Open the CSV file at `path`
    pub fn open(path: impl AsRef<Path>, hints: HashMap<String, ValueType>) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, hints)
    }
}

impl<R: Read> CsvSource<R> {
    /// Read CSV from `reader`; the header row is read immediately
    pub fn from_reader(reader: R, hints: HashMap<String, ValueType>) -> Result<Self, Error> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(Error::MalformedInput(
                "CSV input has no header row".to_string(),
            ));
        }
        if let Some(column) = hints.keys().find(|c| !headers.contains(*c)) {
            return Err(Error::InvalidValue(format!(
                "type hint for unknown column '{column}'"
            )));
        }

        Ok(Self {
            reader,
            headers,
            hints,
            rows_read: 0,
        })
    }

    /// Column names from the header row
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn decode(&self, row: &StringRecord, line: usize) -> Result<Record, Error> {
        let mut record = Record::with_capacity(row.len());
        for (column, field) in self.headers.iter().zip(row.iter()) {
            if field.is_empty() || column.is_empty() {
                continue;
            }
            let value = match self.hints.get(column) {
                Some(value_type) => value_type.parse(field).map_err(|e| {
                    Error::MalformedInput(format!("line {line}, column '{column}': {e}"))
                })?,
                None => AttributeValue::S(field.to_string()),
            };
            let _ = record.insert(column.clone(), value);
        }
        Ok(record)
    }
}

impl<R: Read> PageSource for CsvSource<R> {
    /// Number of data rows consumed so far
    type Token = usize;

    async fn fetch_page(
        &mut self,
        _token: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Page<usize>, Error> {
        let limit = limit.unwrap_or(DEFAULT_FILE_PAGE_SIZE).max(1);
        let mut page = Page::empty();
        let mut row = StringRecord::new();

        while page.records.len() + page.rejected.len() < limit {
            let line = self.rows_read + 2;
            match self.reader.read_record(&mut row) {
                Ok(true) => {
                    self.rows_read += 1;
                    match self.decode(&row, line) {
                        Ok(record) => page.records.push(record),
                        Err(e) => page.rejected.push(e),
                    }
                }
                Ok(false) => return Ok(page),
                Err(e) if matches!(e.kind(), ErrorKind::Io(_)) => return Err(e.into()),
                Err(e) => {
                    self.rows_read += 1;
                    page.rejected
                        .push(Error::MalformedInput(format!("line {line}: {e}")));
                }
            }
        }

        page.next_token = Some(self.rows_read);
        Ok(page)
    }
}

struct CsvSinkState<W: Write> {
    writer: Writer<W>,
    header: Option<Vec<String>>,
    dropped: BTreeSet<String>,
}

/// Writes records as CSV rows
///
/// The header is the sorted attribute names of the first record. Later records are written
/// in that column order; attributes outside the header are dropped with a warning the first
/// time each name is seen, and missing ones are left empty. Nothing is written for an empty run.
pub struct CsvSink<W: Write> {
    state: Mutex<CsvSinkState<W>>,
}

impl<W: Write> fmt::Debug for CsvSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CsvSink")
            .field("header", &state.header)
            .finish()
    }
}

impl CsvSink<File> {
    /// Create (or truncate) the CSV file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::create(path.as_ref())?;
        Ok(Self::from_writer(file))
    }
}

impl<W: Write> CsvSink<W> {
    /// Write CSV to `writer`
    pub fn from_writer(writer: W) -> Self {
        Self {
            state: Mutex::new(CsvSinkState {
                writer: Writer::from_writer(writer),
                header: None,
                dropped: BTreeSet::new(),
            }),
        }
    }

    /// Columns written so far; `None` before the first record
    pub fn header(&self) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .header
            .clone()
    }

    /// Attribute names left out of the file because the header lacks them, sorted
    pub fn dropped_columns(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dropped
            .iter()
            .cloned()
            .collect()
    }

    /// Flush buffered rows and return the underlying writer
    pub fn finish(self) -> Result<W, Error> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        state
            .writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

impl<W: Write> BatchSink for CsvSink<W> {
    async fn write_batch(&self, records: &[Record]) -> Result<BatchResult, Error> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *state;

        for record in records {
            if state.header.is_none() {
                let mut header: Vec<String> = record.keys().cloned().collect();
                header.sort();
                state.writer.write_record(&header)?;
                state.header = Some(header);
            }
            let Some(header) = &state.header else {
                continue;
            };

            let mut unseen: Vec<&String> = record
                .keys()
                .filter(|k| !header.contains(*k) && !state.dropped.contains(*k))
                .collect();
            if !unseen.is_empty() {
                unseen.sort();
                warn!(
                    attributes = ?unseen,
                    header = ?header,
                    "attributes outside the CSV header are not exported"
                );
                state.dropped.extend(unseen.into_iter().cloned());
            }

            let row: Vec<String> = header
                .iter()
                .map(|column| record.get(column).map(render_scalar).unwrap_or_default())
                .collect();
            state.writer.write_record(&row)?;
        }

        state.writer.flush()?;
        Ok(BatchResult::ok())
    }
}
