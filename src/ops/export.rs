use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Error;
use crate::files::CsvSink;
use crate::mutator::{MutationSummary, PagedMutator, TableSource, Transform};
use crate::store::TableStore;

/// Outcome of [`export_csv`]
#[derive(Debug)]
pub struct ExportReport {
    /// File written
    pub path: PathBuf,
    /// Header columns; `None` when the table was empty
    pub columns: Option<Vec<String>>,
    /// Attributes of later items that the header lacks, left out of the file
    pub dropped_columns: Vec<String>,
    /// Outcome of the run
    pub summary: MutationSummary,
}

/// Write every item of `table` to a CSV file at `path`
pub async fn export_csv<S: TableStore>(
    store: &S,
    table: &str,
    path: &Path,
    mutator: &PagedMutator,
) -> Result<ExportReport, Error> {
    let _ = store.describe_key_schema(table).await?;

    let mut source = TableSource::new(store, table);
    let sink = CsvSink::create(path)?;
    let summary = mutator.run(&mut source, &Transform::Copy, &sink).await?;
    let columns = sink.header();
    let dropped_columns = sink.dropped_columns();
    let _ = sink.finish()?;

    info!(
        table,
        path = %path.display(),
        rows = summary.items_written,
        dropped = dropped_columns.len(),
        "export complete"
    );
    Ok(ExportReport {
        path: path.to_path_buf(),
        columns,
        dropped_columns,
        summary,
    })
}
