//! Paged read-transform-write engine
//!
//! Every table-wide workflow is one [`PagedMutator`] run: pages come from a
//! [`PageSource`], each record passes through a [`RecordTransform`], and the survivors
//! are written to a [`BatchSink`] in batches of at most [`BATCH_WRITE_SIZE`] records.
//!
//! ```no_run
//! use dynamo_utils::mutator::{MutatorOptions, PagedMutator, PutSink, TableSource, Transform};
//! use dynamo_utils::store::MemoryStore;
//!
//! # async fn example(store: MemoryStore) -> Result<(), dynamo_utils::Error> {
//! let mut source = TableSource::new(&store, "users");
//! let sink = PutSink::new(&store, "users_copy");
//! let summary = PagedMutator::new(MutatorOptions::default())
//!     .run(&mut source, &Transform::Copy, &sink)
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::record::{KeySchema, Record};
use crate::store::BATCH_WRITE_SIZE;

pub mod sink;
pub mod source;
pub mod transform;

pub use sink::{BatchSink, CollectSink, DeleteSink, PutSink};
pub use source::{Page, PageSource, TableSource};
pub use transform::{RecordTransform, Transform};

/// Retry configuration for page fetches and batch writes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: usize) -> Duration {
        retry_delay(attempt, self.initial_delay, self.max_delay)
    }
}

/// Calculate retry delay with exponential backoff, `initial * 2^attempt` capped at `max`
pub(crate) fn retry_delay(attempt: usize, initial: Duration, max: Duration) -> Duration {
    let factor = 2u64.saturating_pow(attempt.min(u32::MAX as usize) as u32);
    let delay_ms = (initial.as_millis() as u64).saturating_mul(factor);
    let capped_delay = delay_ms.min(max.as_millis() as u64);
    Duration::from_millis(capped_delay)
}

/// What to do with a record that cannot be decoded, transformed or validated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordErrorPolicy {
    /// Log it, count it as rejected and continue
    #[default]
    Skip,
    /// Stop the run with the record's error
    Abort,
}

/// Tuning knobs for a [`PagedMutator`] run
#[derive(Clone, Debug)]
pub struct MutatorOptions {
    /// Records per batch write, 1..=25
    pub batch_size: usize,
    /// Stop once this many records were written or failed
    pub max_items: Option<usize>,
    /// Pause between consecutive batches
    pub inter_batch_delay: Duration,
    /// Page size requested from the source
    pub page_size_hint: Option<usize>,
    /// Backoff for throttled pages and batches
    pub retry: RetryConfig,
    /// Handling of per-record errors
    pub on_record_error: RecordErrorPolicy,
    /// Reject records that lack any of these key attributes
    pub require_keys: Option<KeySchema>,
}

impl Default for MutatorOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_WRITE_SIZE,
            max_items: None,
            inter_batch_delay: Duration::from_millis(100),
            page_size_hint: None,
            retry: RetryConfig::default(),
            on_record_error: RecordErrorPolicy::default(),
            require_keys: None,
        }
    }
}

impl MutatorOptions {
    /// Set the batch size; clamped to 1..=25 when the mutator is built
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Cap the number of records written or failed
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    /// Set the pause between batches
    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    /// Set the page size requested from the source
    pub fn with_page_size_hint(mut self, page_size: Option<usize>) -> Self {
        self.page_size_hint = page_size;
        self
    }

    /// Set the retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-record error policy
    pub fn with_record_error_policy(mut self, policy: RecordErrorPolicy) -> Self {
        self.on_record_error = policy;
        self
    }

    /// Require every written record to carry the key attributes of `schema`
    pub fn with_required_keys(mut self, schema: KeySchema) -> Self {
        self.require_keys = Some(schema);
        self
    }
}

/// Outcome of a [`PagedMutator`] run
#[must_use = "a mutation summary reports failed and rejected records that should be checked"]
#[derive(Clone, Debug, Default)]
pub struct MutationSummary {
    /// Records delivered by the source
    pub items_fetched: usize,
    /// Records the sink applied
    pub items_written: usize,
    /// Records submitted to the sink but not applied
    pub items_failed: usize,
    /// Records the transform dropped, or that a later record with the same key replaced
    pub items_skipped: usize,
    /// Records that failed to decode, transform or validate
    pub items_rejected: usize,
    /// Batches handed to the sink
    pub batches_sent: usize,
    /// Non-empty pages read from the source
    pub pages_scanned: usize,
    /// Retries of throttled or timed-out requests
    pub retries: usize,
    /// The run stopped on cancellation
    pub cancelled: bool,
    /// The run stopped because `max_items` was reached
    pub limit_reached: bool,
    /// Records the sink did not apply
    pub failed_records: Vec<Record>,
    /// Wall-clock time of the run
    pub duration: Duration,
}

impl MutationSummary {
    /// Check if every record was handled and the run was not cancelled
    pub fn is_success(&self) -> bool {
        self.items_failed == 0 && self.items_rejected == 0 && !self.cancelled
    }

    /// Records submitted to the sink
    pub fn processed_count(&self) -> usize {
        self.items_written + self.items_failed
    }

    /// Get success rate as a percentage (0.0 to 100.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.processed_count();
        if total == 0 {
            return 100.0;
        }
        (self.items_written as f64 / total as f64) * 100.0
    }
}

impl fmt::Display for MutationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched {}, written {}, failed {}, skipped {}, rejected {} in {} batches over {} pages ({:.1}% success, {:.2?})",
            self.items_fetched,
            self.items_written,
            self.items_failed,
            self.items_skipped,
            self.items_rejected,
            self.batches_sent,
            self.pages_scanned,
            self.success_rate(),
            self.duration,
        )?;
        if self.limit_reached {
            write!(f, ", item limit reached")?;
        }
        if self.cancelled {
            write!(f, ", cancelled")?;
        }
        Ok(())
    }
}

/// Pages through a source, transforms records and writes them in bounded batches
#[derive(Clone, Debug)]
pub struct PagedMutator {
    options: MutatorOptions,
    cancel: CancellationToken,
}

impl PagedMutator {
    /// Build a mutator, clamping the batch size to 1..=25 and the page size to at least 1
    pub fn new(mut options: MutatorOptions) -> Self {
        let clamped = options.batch_size.clamp(1, BATCH_WRITE_SIZE);
        if clamped != options.batch_size {
            warn!(
                requested = options.batch_size,
                batch_size = clamped,
                "batch size out of range, clamping"
            );
            options.batch_size = clamped;
        }
        if options.page_size_hint == Some(0) {
            warn!("page size of 0 requested, using 1");
            options.page_size_hint = Some(1);
        }
        Self {
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run before the next page or batch once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Effective options
    pub fn options(&self) -> &MutatorOptions {
        &self.options
    }

    /// Copy of this mutator that also rejects records lacking the key attributes of `schema`
    pub fn requiring_keys(&self, schema: KeySchema) -> Self {
        let mut mutator = self.clone();
        mutator.options.require_keys = Some(schema);
        mutator
    }

    fn remaining(&self, summary: &MutationSummary) -> Option<usize> {
        self.options
            .max_items
            .map(|max| max.saturating_sub(summary.processed_count()))
    }

    /// Run the mutation to completion, cancellation or the item limit
    pub async fn run<S, T, K>(
        &self,
        source: &mut S,
        transform: &T,
        sink: &K,
    ) -> Result<MutationSummary, Error>
    where
        S: PageSource,
        T: RecordTransform + ?Sized,
        K: BatchSink,
    {
        let started = Instant::now();
        let mut summary = MutationSummary::default();
        let mut token: Option<S::Token> = None;

        'pages: loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if self.remaining(&summary) == Some(0) {
                summary.limit_reached = true;
                break;
            }

            let limit = match (self.options.page_size_hint, self.remaining(&summary)) {
                (Some(hint), Some(remaining)) => Some(hint.min(remaining)),
                (hint, _) => hint,
            };
            let Page {
                records,
                rejected,
                next_token,
            } = self
                .fetch_page(source, token.take(), limit, &mut summary)
                .await?;

            if records.is_empty() && rejected.is_empty() {
                debug!("source returned an empty page, stopping");
                break;
            }
            summary.pages_scanned += 1;
            summary.items_fetched += records.len();
            debug!(
                page = summary.pages_scanned,
                records = records.len(),
                rejected = rejected.len(),
                "fetched page"
            );

            for error in rejected {
                self.reject(error, &mut summary)?;
            }

            let mut pending = Vec::with_capacity(records.len());
            for record in records {
                match transform.apply(record) {
                    Ok(Some(record)) => {
                        if let Some(schema) = &self.options.require_keys {
                            let missing = schema.missing_in(&record);
                            if !missing.is_empty() {
                                let error = Error::MalformedInput(format!(
                                    "record is missing key attribute(s) {}",
                                    missing.join(", ")
                                ));
                                self.reject(error, &mut summary)?;
                                continue;
                            }
                        }
                        pending.push(record);
                    }
                    Ok(None) => summary.items_skipped += 1,
                    Err(error) => self.reject(error, &mut summary)?,
                }
            }
            if let Some(schema) = &self.options.require_keys {
                pending = collapse_duplicate_keys(schema, pending, &mut summary);
            }

            let mut rest = pending.as_slice();
            while !rest.is_empty() {
                let size = match self.remaining(&summary) {
                    Some(0) => {
                        summary.limit_reached = true;
                        break 'pages;
                    }
                    Some(remaining) => self.options.batch_size.min(remaining),
                    None => self.options.batch_size,
                };
                let (chunk, tail) = rest.split_at(size.min(rest.len()));

                if self.cancel.is_cancelled() {
                    summary.cancelled = true;
                    break 'pages;
                }
                if summary.batches_sent > 0 && !self.options.inter_batch_delay.is_zero() {
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            summary.cancelled = true;
                            break 'pages;
                        }
                        () = sleep(self.options.inter_batch_delay) => {}
                    }
                }

                self.write_batch(sink, chunk, &mut summary).await?;
                rest = tail;
            }

            match next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        if self.remaining(&summary) == Some(0) {
            summary.limit_reached = true;
        }
        summary.duration = started.elapsed();
        info!(
            fetched = summary.items_fetched,
            written = summary.items_written,
            failed = summary.items_failed,
            skipped = summary.items_skipped,
            rejected = summary.items_rejected,
            batches = summary.batches_sent,
            cancelled = summary.cancelled,
            "mutation finished"
        );
        Ok(summary)
    }

    fn reject(&self, error: Error, summary: &mut MutationSummary) -> Result<(), Error> {
        match self.options.on_record_error {
            RecordErrorPolicy::Abort => Err(error),
            RecordErrorPolicy::Skip => {
                warn!(error = %error, "skipping record");
                summary.items_rejected += 1;
                Ok(())
            }
        }
    }

    async fn fetch_page<S: PageSource>(
        &self,
        source: &mut S,
        token: Option<S::Token>,
        limit: Option<usize>,
        summary: &mut MutationSummary,
    ) -> Result<Page<S::Token>, Error> {
        let mut attempt = 0;
        loop {
            match source.fetch_page(token.clone(), limit).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.options.retry.max_retries => {
                    let delay = self.options.retry.delay(attempt);
                    warn!(error = %e, attempt = attempt + 1, ?delay, "page fetch failed, retrying");
                    summary.retries += 1;
                    attempt += 1;
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_batch<K: BatchSink>(
        &self,
        sink: &K,
        chunk: &[Record],
        summary: &mut MutationSummary,
    ) -> Result<(), Error> {
        let mut attempt = 0;
        loop {
            match sink.write_batch(chunk).await {
                Ok(result) => {
                    summary.batches_sent += 1;
                    let failed = result.failed.len().min(chunk.len());
                    if failed > 0 {
                        warn!(failed, submitted = chunk.len(), "batch partially failed");
                    }
                    summary.items_written += chunk.len() - failed;
                    summary.items_failed += failed;
                    summary.failed_records.extend(result.failed);
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.options.retry.max_retries => {
                    let delay = self.options.retry.delay(attempt);
                    warn!(error = %e, attempt = attempt + 1, ?delay, "batch write failed, retrying");
                    summary.retries += 1;
                    attempt += 1;
                    sleep(delay).await;
                }
                Err(e) if e.is_retryable() || matches!(e, Error::BatchRejected { .. }) => {
                    warn!(error = %e, records = chunk.len(), "batch failed, continuing");
                    summary.batches_sent += 1;
                    summary.items_failed += chunk.len();
                    summary.failed_records.extend(chunk.iter().cloned());
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Keep one record per key, a later record taking the place of an earlier one
///
/// A batch write refuses two requests for the same item, so a page is collapsed before it is
/// chunked.
fn collapse_duplicate_keys(
    schema: &KeySchema,
    records: Vec<Record>,
    summary: &mut MutationSummary,
) -> Vec<Record> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());
    let mut replaced = 0;
    for record in records {
        let Some(identity) = schema.key_identity(&record) else {
            unique.push(record);
            continue;
        };
        match slots.entry(identity) {
            Entry::Occupied(slot) => {
                unique[*slot.get()] = record;
                replaced += 1;
            }
            Entry::Vacant(slot) => {
                let _ = slot.insert(unique.len());
                unique.push(record);
            }
        }
    }
    if replaced > 0 {
        warn!(
            replaced,
            "records repeating a key in the same page were replaced by the later record"
        );
        summary.items_skipped += replaced;
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;

    #[test]
    fn test_retry_delay() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(2000);

        assert_eq!(retry_delay(0, initial, max), Duration::from_millis(100));
        assert_eq!(retry_delay(1, initial, max), Duration::from_millis(200));
        assert_eq!(retry_delay(2, initial, max), Duration::from_millis(400));
        assert_eq!(retry_delay(3, initial, max), Duration::from_millis(800));
        assert_eq!(retry_delay(4, initial, max), Duration::from_millis(1600));
        assert_eq!(retry_delay(5, initial, max), Duration::from_millis(2000)); // Capped
        assert_eq!(retry_delay(80, initial, max), Duration::from_millis(2000));
    }

    #[test]
    fn test_collapse_duplicate_keys_keeps_last_write() {
        let schema = KeySchema::composite("game", "player");
        let record = |game: &str, player: &str, score: &str| {
            Record::from([
                ("game".to_string(), AttributeValue::S(game.into())),
                ("player".to_string(), AttributeValue::S(player.into())),
                ("score".to_string(), AttributeValue::N(score.into())),
            ])
        };
        let records = vec![
            record("chess", "a", "1"),
            record("chess", "b", "2"),
            record("chess", "a", "3"),
            record("go", "a", "4"),
            record("chess", "a", "5"),
        ];
        let mut summary = MutationSummary::default();

        let unique = collapse_duplicate_keys(&schema, records, &mut summary);

        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0]["score"], AttributeValue::N("5".into()));
        assert_eq!(unique[1]["player"], AttributeValue::S("b".into()));
        assert_eq!(unique[2]["game"], AttributeValue::S("go".into()));
        assert_eq!(summary.items_skipped, 2);
    }

    #[test]
    fn test_batch_size_is_clamped() {
        let mutator = PagedMutator::new(MutatorOptions::default().with_batch_size(100));
        assert_eq!(mutator.options().batch_size, 25);

        let mutator = PagedMutator::new(MutatorOptions::default().with_batch_size(0));
        assert_eq!(mutator.options().batch_size, 1);

        let mutator = PagedMutator::new(MutatorOptions::default().with_page_size_hint(Some(0)));
        assert_eq!(mutator.options().page_size_hint, Some(1));
    }

    #[test]
    fn test_summary_rates() {
        let summary = MutationSummary {
            items_written: 8,
            items_failed: 2,
            ..Default::default()
        };
        assert_eq!(summary.processed_count(), 10);
        assert!((summary.success_rate() - 80.0).abs() < f64::EPSILON);
        assert!(!summary.is_success());

        let empty = MutationSummary::default();
        assert!(empty.is_success());
        assert!((empty.success_rate() - 100.0).abs() < f64::EPSILON);
    }
}
