use tracing::info;

use crate::error::Error;
use crate::mutator::{MutationSummary, PagedMutator, PutSink, TableSource, Transform};
use crate::store::TableStore;

/// Copy every item of `source_table` into `dest_table`
///
/// The stores may differ, e.g. a local endpoint and a cloud account. Items that lack the
/// destination's key attributes are rejected. Puts overwrite by key, so re-running a
/// migration leaves the destination as a single run would.
pub async fn migrate_table<S, D>(
    source_store: &S,
    source_table: &str,
    dest_store: &D,
    dest_table: &str,
    mutator: &PagedMutator,
) -> Result<MutationSummary, Error>
where
    S: TableStore,
    D: TableStore,
{
    let _ = source_store.describe_key_schema(source_table).await?;
    let dest_schema = dest_store.describe_key_schema(dest_table).await?;
    info!(source_table, dest_table, key = %dest_schema, "migrating items");

    let mut source = TableSource::new(source_store, source_table);
    let sink = PutSink::new(dest_store, dest_table);
    mutator
        .requiring_keys(dest_schema)
        .run(&mut source, &Transform::Copy, &sink)
        .await
}
