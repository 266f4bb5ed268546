//! File-backed sources and sinks
//!
//! CSV files are read with a header row and written with one; JSON input is either a single
//! document (array of objects or one object) or JSON Lines.

mod csv;
mod json;

pub use self::csv::{CsvSink, CsvSource};
pub use self::json::{JsonFormat, JsonSource};

/// Records per page when the mutator does not pass a page size
pub const DEFAULT_FILE_PAGE_SIZE: usize = 100;
