use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::Error;
use crate::mutator::{CollectSink, MutationSummary, PagedMutator, TableSource, Transform};
use crate::record::{Record, render_scalar};
use crate::store::TableStore;

/// Cluster label for items that lack the clustering attribute
pub const MISSING_VALUE: &str = "None";

/// Items read by [`scan_table`]
#[derive(Debug)]
pub struct ScanReport {
    /// Items that passed the filter
    pub items: Vec<Record>,
    /// Item count per value of the clustering attribute
    pub clusters: Option<BTreeMap<String, usize>>,
    /// Outcome of the run
    pub summary: MutationSummary,
}

impl ScanReport {
    /// Clusters ordered by descending count, then by value
    pub fn ranked_clusters(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .clusters
            .iter()
            .flatten()
            .map(|(value, count)| (value.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked
    }
}

/// Timestamp `days` before `now`, formatted the way `created_at` attributes are stored
pub fn cutoff_for_last_days(days: u32, now: DateTime<Utc>) -> String {
    (now - ChronoDuration::days(i64::from(days)))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Read every item of `table` that `filter` keeps
///
/// `filter` is usually [`Transform::Copy`] or [`Transform::NewerThan`]. With `cluster_by`
/// the report also counts items per value of that attribute.
pub async fn scan_table<S: TableStore>(
    store: &S,
    table: &str,
    filter: &Transform,
    cluster_by: Option<&str>,
    mutator: &PagedMutator,
) -> Result<ScanReport, Error> {
    let _ = store.describe_key_schema(table).await?;

    let mut source = TableSource::new(store, table);
    let sink = CollectSink::new();
    let summary = mutator.run(&mut source, filter, &sink).await?;
    let items = sink.into_records();

    let clusters = cluster_by.map(|attribute| {
        let mut clusters = BTreeMap::new();
        for item in &items {
            let value = item
                .get(attribute)
                .map(render_scalar)
                .unwrap_or_else(|| MISSING_VALUE.to_string());
            *clusters.entry(value).or_insert(0) += 1;
        }
        clusters
    });

    info!(table, items = items.len(), "scan complete");
    Ok(ScanReport {
        items,
        clusters,
        summary,
    })
}
