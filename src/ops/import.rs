use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::Error;
use crate::files::{CsvSource, JsonFormat, JsonSource};
use crate::mutator::{MutationSummary, PageSource, PagedMutator, PutSink, Transform};
use crate::record::ValueType;
use crate::store::TableStore;

/// Put every record from `source` into `table`
///
/// With `keep`, only the listed attributes are written. Records lacking the table's key
/// attributes are rejected.
pub async fn import_records<S, P>(
    store: &S,
    table: &str,
    source: &mut P,
    keep: Option<Vec<String>>,
    mutator: &PagedMutator,
) -> Result<MutationSummary, Error>
where
    S: TableStore,
    P: PageSource,
{
    let schema = store.describe_key_schema(table).await?;
    if let Some(keep) = &keep {
        let missing = schema
            .attributes()
            .map(|(name, _)| name)
            .find(|name| !keep.iter().any(|k| k == name));
        if let Some(name) = missing {
            return Err(Error::InvalidValue(format!(
                "kept attributes must include key attribute '{name}'"
            )));
        }
    }

    let sink = PutSink::new(store, table);
    mutator
        .requiring_keys(schema)
        .run(source, &Transform::FileIngest { keep }, &sink)
        .await
}

/// Import the CSV file at `path` into `table`
///
/// Columns listed in `hints` are parsed as the given type; all others are strings.
pub async fn import_csv<S: TableStore>(
    store: &S,
    table: &str,
    path: &Path,
    hints: HashMap<String, ValueType>,
    mutator: &PagedMutator,
) -> Result<MutationSummary, Error> {
    let mut source = CsvSource::open(path, hints)?;
    info!(table, path = %path.display(), columns = source.headers().len(), "importing CSV");
    import_records(store, table, &mut source, None, mutator).await
}

/// Import the JSON or JSON Lines file at `path` into `table`
///
/// A file without a single record is malformed input.
pub async fn import_json<S: TableStore>(
    store: &S,
    table: &str,
    path: &Path,
    format: JsonFormat,
    keep: Option<Vec<String>>,
    mutator: &PagedMutator,
) -> Result<MutationSummary, Error> {
    let mut source = JsonSource::open(path, format)?;
    info!(table, path = %path.display(), ?format, "importing JSON");
    let summary = import_records(store, table, &mut source, keep, mutator).await?;

    if summary.items_fetched == 0 && summary.items_rejected == 0 {
        return Err(Error::MalformedInput(format!(
            "{} contains no records",
            path.display()
        )));
    }
    Ok(summary)
}
