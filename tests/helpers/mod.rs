/// Test helpers and fixtures for integration tests
///
/// This module provides common test utilities, fixtures, and helper functions
/// used across all integration tests.
pub mod fixtures;

pub use dynamo_utils::mutator::{
    BatchSink, MutatorOptions, Page, PageSource, PagedMutator, RetryConfig, Transform,
};
pub use dynamo_utils::record::{KeySchema, Record, record_from_json, to_record};
pub use dynamo_utils::store::{BatchResult, MemoryStore, TableStore};
pub use dynamo_utils::{AttributeValue, Error};
pub use serde::{Deserialize, Serialize};

// Re-export common fixtures
pub use fixtures::{
    OBJECTS_TABLE, TestObject, TestUser, USERS_TABLE, seeded_objects, seeded_users, test_users,
};

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Generate a unique test prefix for isolation
///
/// Returns a ULID-based prefix to avoid test data conflicts
#[allow(dead_code)]
pub fn unique_test_prefix(name: &str) -> String {
    format!("{}_{}_", name, rusty_ulid::generate_ulid_string())
}

/// Unique path in the system temp directory
#[allow(dead_code)]
pub fn temp_path(name: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}.{}", unique_test_prefix(name), extension))
}

/// Options without delays so tests run fast
#[allow(dead_code)]
pub fn fast_options() -> MutatorOptions {
    MutatorOptions::default()
        .with_inter_batch_delay(Duration::ZERO)
        .with_retry(RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        })
}

/// Mutator built from [`fast_options`]
#[allow(dead_code)]
pub fn fast_mutator() -> PagedMutator {
    PagedMutator::new(fast_options())
}

/// Source serving records from memory in fixed-size pages
#[allow(dead_code)]
#[derive(Debug)]
pub struct VecSource {
    records: Vec<Record>,
    rejected: Vec<(usize, String)>,
    page_size: usize,
    /// `limit` passed to every `fetch_page` call
    pub limits_seen: Vec<Option<usize>>,
}

#[allow(dead_code)]
impl VecSource {
    pub fn new(records: Vec<Record>, page_size: usize) -> Self {
        Self {
            records,
            rejected: Vec::new(),
            page_size,
            limits_seen: Vec::new(),
        }
    }

    /// Report a decode error with `message` on the page containing position `at`
    pub fn with_rejected(mut self, at: usize, message: &str) -> Self {
        self.rejected.push((at, message.to_string()));
        self
    }
}

impl PageSource for VecSource {
    type Token = usize;

    async fn fetch_page(
        &mut self,
        token: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Page<usize>, Error> {
        self.limits_seen.push(limit);
        let start = token.unwrap_or(0);
        let size = limit.unwrap_or(self.page_size).min(self.page_size);
        let end = (start + size).min(self.records.len());

        let mut page = Page::new(
            self.records[start.min(end)..end].to_vec(),
            (end < self.records.len()).then_some(end),
        );
        page.rejected = self
            .rejected
            .iter()
            .filter(|(at, _)| (start..end.max(start + 1)).contains(at))
            .map(|(_, message)| Error::MalformedInput(message.clone()))
            .collect();
        Ok(page)
    }
}

/// Scripted outcome for one [`RecordingSink`] batch
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Fail with a retryable throttling error
    Throttle,
    /// Fail with a batch validation error
    Reject,
    /// Fail with a non-retryable error
    Fatal,
    /// Leave the first `n` records unprocessed
    Unprocessed(usize),
}

/// Sink that records every batch and replays scripted outcomes
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<Record>>>,
    script: Mutex<VecDeque<Outcome>>,
    on_write: Option<tokio_util::sync::CancellationToken>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next calls; calls after the script run out succeed
    pub fn scripted(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Cancel `token` after the first successful batch
    pub fn cancelling(token: tokio_util::sync::CancellationToken) -> Self {
        Self {
            on_write: Some(token),
            ..Self::default()
        }
    }

    /// Sizes of the batches applied, in order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    /// Records applied, in order
    pub fn records(&self) -> Vec<Record> {
        self.batches.lock().unwrap().concat()
    }
}

impl BatchSink for RecordingSink {
    async fn write_batch(&self, records: &[Record]) -> Result<BatchResult, Error> {
        let next = self.script.lock().unwrap().pop_front();
        let failed = match next {
            Some(Outcome::Throttle) => {
                return Err(Error::Throttled {
                    table: "recording".to_string(),
                    message: "slow down".to_string(),
                });
            }
            Some(Outcome::Reject) => {
                return Err(Error::BatchRejected {
                    table: "recording".to_string(),
                    message: "item too large".to_string(),
                });
            }
            Some(Outcome::Fatal) => return Err(Error::TableNotFound("recording".to_string())),
            Some(Outcome::Unprocessed(n)) => n.min(records.len()),
            None => 0,
        };

        self.batches
            .lock()
            .unwrap()
            .push(records[failed..].to_vec());
        if let Some(token) = &self.on_write {
            token.cancel();
        }
        Ok(BatchResult {
            failed: records[..failed].to_vec(),
        })
    }
}

/// Confirmation double that answers the same way every time and remembers the prompts
#[allow(dead_code)]
#[derive(Debug)]
pub struct ScriptedConfirm {
    answer: bool,
    pub prompts: Vec<String>,
}

#[allow(dead_code)]
impl ScriptedConfirm {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Vec::new(),
        }
    }
}

impl dynamo_utils::confirm::Confirm for ScriptedConfirm {
    fn confirm(&mut self, message: &str) -> bool {
        self.prompts.push(message.to_string());
        self.answer
    }
}
