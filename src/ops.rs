//! Table workflows
//!
//! Each workflow checks its preconditions against the table metadata before writing
//! anything, then runs a [`PagedMutator`](crate::mutator::PagedMutator) with the source,
//! transform and sink it needs.

mod columns;
mod export;
mod import;
mod item;
mod migrate;
mod scan;
mod wipe;

pub use columns::{remove_column, rename_column};
pub use export::{ExportReport, export_csv};
pub use import::{import_csv, import_json, import_records};
pub use item::{ValueUpdate, delete_item, get_item, put_item, set_value, update_item};
pub use migrate::migrate_table;
pub use scan::{MISSING_VALUE, ScanReport, cutoff_for_last_days, scan_table};
pub use wipe::{DEFAULT_SETTLE_DELAY, WipeReport, wipe_table};
