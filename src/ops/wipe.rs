use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::Error;
use crate::mutator::{DeleteSink, MutationSummary, PagedMutator, TableSource, Transform};
use crate::store::TableStore;

/// Wait before re-counting a wiped table
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Outcome of [`wipe_table`]
#[derive(Debug)]
pub struct WipeReport {
    /// The table was verified empty and the run was not cancelled
    pub success: bool,
    /// Items counted before deleting
    pub initial_count: usize,
    /// Items the delete batches applied
    pub deleted_count: usize,
    /// Items counted after deleting
    pub remaining_count: usize,
    /// Outcome of the delete run
    pub summary: MutationSummary,
}

impl fmt::Display for WipeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "initial {}, deleted {}, remaining {}",
            self.initial_count, self.deleted_count, self.remaining_count
        )
    }
}

/// Delete every item of `table`
///
/// The key schema is read from the table; when `expected_partition_key` is given and does
/// not match, nothing is deleted. The result is verified with a fresh count after
/// `settle_delay` instead of trusting the delete tally.
pub async fn wipe_table<S: TableStore>(
    store: &S,
    table: &str,
    expected_partition_key: Option<&str>,
    settle_delay: Duration,
    mutator: &PagedMutator,
) -> Result<WipeReport, Error> {
    let schema = store.describe_key_schema(table).await?;
    if let Some(expected) = expected_partition_key {
        schema.ensure_partition(expected)?;
    }

    let initial_count = store.count_items(table).await?;
    if initial_count == 0 {
        info!(table, "table is already empty");
        return Ok(WipeReport {
            success: true,
            initial_count: 0,
            deleted_count: 0,
            remaining_count: 0,
            summary: MutationSummary::default(),
        });
    }
    info!(table, items = initial_count, key = %schema, "deleting all items");

    let mut source = TableSource::new(store, table);
    let sink = DeleteSink::new(store, table);
    let summary = mutator
        .run(&mut source, &Transform::DeleteKey(schema), &sink)
        .await?;

    if !settle_delay.is_zero() {
        sleep(settle_delay).await;
    }
    let remaining_count = store.count_items(table).await?;
    if remaining_count > 0 {
        warn!(table, remaining = remaining_count, "items remain after wipe");
    }

    Ok(WipeReport {
        success: remaining_count == 0 && !summary.cancelled,
        initial_count,
        deleted_count: summary.items_written,
        remaining_count,
        summary,
    })
}
