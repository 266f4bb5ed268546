use tracing::info;

use crate::error::Error;
use crate::mutator::{MutationSummary, PagedMutator, PutSink, TableSource, Transform};
use crate::store::TableStore;

/// Remove `column` from every item of `table` that has it
///
/// Items without the column are skipped and not rewritten.
pub async fn remove_column<S: TableStore>(
    store: &S,
    table: &str,
    column: &str,
    mutator: &PagedMutator,
) -> Result<MutationSummary, Error> {
    let schema = store.describe_key_schema(table).await?;
    schema.ensure_not_key(column)?;
    info!(table, column, "removing column");

    let mut source = TableSource::new(store, table);
    let sink = PutSink::new(store, table);
    mutator
        .run(&mut source, &Transform::DropColumn(column.to_string()), &sink)
        .await
}

/// Rename attribute `from` to `to` on every item of `table` that has it
///
/// An existing `to` value is overwritten. Items without `from` are skipped.
pub async fn rename_column<S: TableStore>(
    store: &S,
    table: &str,
    from: &str,
    to: &str,
    mutator: &PagedMutator,
) -> Result<MutationSummary, Error> {
    if from == to {
        return Err(Error::InvalidValue(format!(
            "cannot rename column '{from}' to itself"
        )));
    }
    let schema = store.describe_key_schema(table).await?;
    schema.ensure_not_key(from)?;
    schema.ensure_not_key(to)?;
    info!(table, from, to, "renaming column");

    let transform = Transform::RenameColumn {
        from: from.to_string(),
        to: to.to_string(),
    };
    let mut source = TableSource::new(store, table);
    let sink = PutSink::new(store, table);
    mutator.run(&mut source, &transform, &sink).await
}
