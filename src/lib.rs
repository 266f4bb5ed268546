//! # DynamoDB Table Utilities
//!
//! Bulk and single-item operations on DynamoDB tables, built around one reusable engine:
//! - Scan a table, optionally filtered by date or clustered by an attribute
//! - Wipe a table and verify it is empty afterwards
//! - Migrate items between tables, accounts or endpoints
//! - Import CSV, JSON and JSON Lines files; export tables to CSV
//! - Remove or rename an attribute on every item
//! - Get, put, update and delete single items
//!
//! ## Features
//!
//! - **One engine**: every table-wide operation is a [`PagedMutator`] run that pages a
//!   source, transforms each record and writes batches of at most 25 to a sink
//! - **Partial failure aware**: unprocessed and rejected records are counted and returned,
//!   never silently dropped
//! - **Throttling friendly**: fixed delay between batches plus exponential backoff on
//!   throttling and timeouts
//! - **Cancellable**: runs stop cleanly between batches
//! - **Testable**: [`store::MemoryStore`] implements the same [`TableStore`] trait as the
//!   SDK-backed [`store::DynamoStore`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_utils::client::{ClientOptions, connect};
//! use dynamo_utils::mutator::{MutatorOptions, PagedMutator};
//! use dynamo_utils::store::DynamoStore;
//! use dynamo_utils::{Error, ops};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let options = ClientOptions {
//!         endpoint_url: Some("http://localhost:8000".to_string()),
//!         ..Default::default()
//!     };
//!     let store = DynamoStore::new(connect(&options).await);
//!
//!     let mutator = PagedMutator::new(MutatorOptions::default());
//!     let summary = ops::migrate_table(&store, "users", &store, "users_v2", &mutator).await?;
//!     println!("{summary}");
//!
//!     Ok(())
//! }
//! ```
#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    unused_extern_crates,
    unused_import_braces,
    deprecated,
    unreachable_code
)]

mod error;
pub use error::Error;

pub mod cli;

/// DynamoDB client construction
pub mod client;

/// Confirmation prompts for destructive commands
pub mod confirm;

pub mod files;

/// Tracing subscriber setup
pub mod logging;

pub mod mutator;

pub mod ops;

/// Records, key schemas and value conversion
pub mod record;

/// Table access
pub mod store;

// Re-export main types for convenience
pub use mutator::{
    MutationSummary, MutatorOptions, PagedMutator, RecordErrorPolicy, RecordTransform,
    RetryConfig, Transform,
};
pub use record::{KeySchema, Record};
pub use store::TableStore;

// Re-export the SDK value type records are made of
pub use aws_sdk_dynamodb::types::AttributeValue;
