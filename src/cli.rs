//! Command-line interface
//!
//! [`CliArgs`] is the clap command tree. [`execute`] runs one command against the given
//! stores and returns a [`Report`]; it never prints, so it can be driven from tests with a
//! [`MemoryStore`](crate::store::MemoryStore) and a scripted [`Confirm`].

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::ClientOptions;
use crate::confirm::Confirm;
use crate::error::Error;
use crate::files::JsonFormat;
use crate::mutator::{
    MutationSummary, MutatorOptions, PagedMutator, RecordErrorPolicy, RetryConfig, Transform,
};
use crate::ops::{self, ExportReport, ScanReport, ValueUpdate, WipeReport};
use crate::record::{Record, ValueType, record_from_json_str, record_to_json};
use crate::store::{ItemUpdate, TableStore};

/// Bulk and single-item operations on DynamoDB tables
#[derive(Parser, Debug)]
#[command(name = "dynamo-utils", version, about, long_about = None)]
pub struct CliArgs {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Exit with an error when any record failed or was rejected
    #[arg(long, global = true)]
    pub strict: bool,

    /// Alternate endpoint, e.g. http://localhost:8000 for DynamoDB Local
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// AWS region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// AWS credentials profile
    #[arg(long, global = true)]
    pub profile: Option<String>,

    #[allow(missing_docs)]
    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    /// Connection options for the primary store
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            endpoint_url: self.endpoint.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
        }
    }

    /// Connection options for the migration destination, if it differs from the primary store
    pub fn dest_client_options(&self) -> Option<ClientOptions> {
        match &self.command {
            Command::Migrate {
                dest_endpoint,
                dest_region,
                ..
            } if dest_endpoint.is_some() || dest_region.is_some() => Some(ClientOptions {
                endpoint_url: dest_endpoint.clone().or_else(|| self.endpoint.clone()),
                region: dest_region.clone().or_else(|| self.region.clone()),
                profile: self.profile.clone(),
            }),
            _ => None,
        }
    }
}

/// Flags shared by every command that pages through records
#[derive(Args, Debug, Clone)]
pub struct MutationArgs {
    /// Records per batch write (clamped to 1..=25)
    #[arg(long, default_value_t = 25)]
    pub batch_size: usize,

    /// Stop after this many records were written
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Records requested per page
    #[arg(long, value_parser = parse_page_size)]
    pub page_size: Option<usize>,

    /// Retries for throttled or timed-out requests
    #[arg(long, default_value_t = 5)]
    pub max_retries: usize,
}

impl Default for MutationArgs {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_items: None,
            delay_ms: None,
            page_size: None,
            max_retries: 5,
        }
    }
}

impl MutationArgs {
    /// Mutator options, using `default_delay` when `--delay-ms` was not given
    pub fn options(&self, default_delay: Duration) -> MutatorOptions {
        MutatorOptions::default()
            .with_batch_size(self.batch_size)
            .with_max_items(self.max_items)
            .with_inter_batch_delay(self.delay_ms.map_or(default_delay, Duration::from_millis))
            .with_page_size_hint(self.page_size)
            .with_retry(RetryConfig {
                max_retries: self.max_retries,
                ..RetryConfig::default()
            })
    }
}

/// Layout of a JSON import file
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum JsonLayout {
    /// Array of objects, or a single object
    Document,
    /// One object per line
    Lines,
}

impl From<JsonLayout> for JsonFormat {
    fn from(layout: JsonLayout) -> Self {
        match layout {
            JsonLayout::Document => JsonFormat::Document,
            JsonLayout::Lines => JsonFormat::Lines,
        }
    }
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every item of a table as JSON lines
    Scan {
        /// Table to scan
        table: String,
        /// Count items per value of this attribute
        #[arg(long)]
        cluster_by: Option<String>,
        /// Only items whose date attribute falls within the last N days
        #[arg(long)]
        last_days: Option<u32>,
        /// Attribute holding an ISO-8601 timestamp, used with --last-days
        #[arg(long, default_value = "created_at")]
        date_field: String,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Delete every item of a table
    #[command(alias = "delete-all")]
    Wipe {
        /// Table to wipe
        table: String,
        /// Expected partition key name; the wipe is refused if the table's differs
        #[arg(long)]
        partition_key: Option<String>,
        /// Wait before re-counting, in milliseconds
        #[arg(long, default_value_t = 1000)]
        settle_ms: u64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Copy every item of one table into another
    Migrate {
        /// Table to read
        source_table: String,
        /// Table to write
        dest_table: String,
        /// Endpoint of the destination table, if different
        #[arg(long)]
        dest_endpoint: Option<String>,
        /// Region of the destination table, if different
        #[arg(long)]
        dest_region: Option<String>,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Put every row of a CSV file into a table
    #[command(alias = "insert")]
    ImportCsv {
        /// Destination table
        table: String,
        /// CSV file with a header row
        file: PathBuf,
        /// Column type, e.g. `--type age=N`; repeatable
        #[arg(long = "type", value_parser = parse_type_hint)]
        types: Vec<(String, ValueType)>,
        /// Stop at the first bad row instead of skipping it
        #[arg(long)]
        fail_fast: bool,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Put every object of a JSON or JSON Lines file into a table
    ImportJson {
        /// Destination table
        table: String,
        /// JSON file
        file: PathBuf,
        /// File layout
        #[arg(long, value_enum, default_value = "document")]
        layout: JsonLayout,
        /// Only write these attributes (comma separated)
        #[arg(long, value_delimiter = ',')]
        keep: Vec<String>,
        /// Skip bad records instead of stopping at the first one
        #[arg(long)]
        skip_errors: bool,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Write every item of a table to a CSV file
    ExportCsv {
        /// Table to export
        table: String,
        /// Output file
        file: PathBuf,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Remove an attribute from every item
    RemoveColumn {
        /// Table to rewrite
        table: String,
        /// Attribute to remove
        column: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Rename an attribute on every item
    RenameColumn {
        /// Table to rewrite
        table: String,
        /// Current attribute name
        from: String,
        /// New attribute name
        to: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
        #[allow(missing_docs)]
        #[command(flatten)]
        mutation: MutationArgs,
    },

    /// Set one attribute of an item addressed by its partition key
    SetValue {
        /// Table holding the item
        table: String,
        /// Partition key name
        #[arg(long)]
        pk: String,
        /// Partition key value
        #[arg(long)]
        pk_value: String,
        /// Partition key type
        #[arg(long, value_enum, default_value = "S")]
        pk_type: ValueType,
        /// Attribute to set
        #[arg(long)]
        attribute: String,
        /// Refuse the update unless the attribute currently has this value
        #[arg(long)]
        old_value: Option<String>,
        /// New value
        #[arg(long)]
        new_value: String,
        /// Type of the new value
        #[arg(long = "type", value_enum, default_value = "S")]
        value_type: ValueType,
    },

    /// Print one item
    Get {
        /// Table holding the item
        table: String,
        /// Primary key as a JSON object, e.g. '{"id": "42"}'
        #[arg(long, value_parser = parse_record)]
        key: Record,
    },

    /// Insert or replace one item
    Put {
        /// Destination table
        table: String,
        /// Item as a JSON object
        #[arg(long, value_parser = parse_record)]
        item: Record,
    },

    /// Update attributes of one existing item
    Update {
        /// Table holding the item
        table: String,
        /// Primary key as a JSON object
        #[arg(long, value_parser = parse_record)]
        key: Record,
        /// Attributes to set, as a JSON object
        #[arg(long, value_parser = parse_record)]
        set: Option<Record>,
        /// Attributes to remove (comma separated)
        #[arg(long, value_delimiter = ',')]
        remove: Vec<String>,
    },

    /// Delete one item
    Delete {
        /// Table holding the item
        table: String,
        /// Primary key as a JSON object
        #[arg(long, value_parser = parse_record)]
        key: Record,
    },
}

fn parse_record(text: &str) -> Result<Record, String> {
    record_from_json_str(text).map_err(|e| e.to_string())
}

fn parse_page_size(text: &str) -> Result<usize, String> {
    match text.trim().parse::<usize>() {
        Ok(0) => Err("page size must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(e) => Err(format!("'{text}' is not a page size: {e}")),
    }
}

fn parse_type_hint(text: &str) -> Result<(String, ValueType), String> {
    let (column, kind) = text
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=TYPE, got '{text}'"))?;
    let value_type = ValueType::from_str(kind.trim(), true)?;
    Ok((column.trim().to_string(), value_type))
}

/// Result of a command
#[derive(Debug)]
pub enum Report {
    /// Items read by `scan`
    Scan(ScanReport),
    /// Outcome of `wipe`
    Wipe(WipeReport),
    /// Outcome of a paged command that writes to a table
    Mutation {
        /// Command name
        action: &'static str,
        /// Run outcome
        summary: MutationSummary,
    },
    /// Outcome of `export-csv`
    Export(ExportReport),
    /// A single item
    Item(Record),
    /// A single-item command without output
    Done(String),
    /// The operator declined the confirmation prompt
    Declined,
}

impl Report {
    /// Check if the command finished but left records failed, rejected or unprocessed
    pub fn is_partial_failure(&self) -> bool {
        match self {
            Report::Scan(report) => !report.summary.is_success(),
            Report::Wipe(report) => !report.success,
            Report::Mutation { summary, .. } => !summary.is_success(),
            Report::Export(report) => !report.summary.is_success(),
            Report::Item(_) | Report::Done(_) | Report::Declined => false,
        }
    }

    /// One-line human summary
    pub fn summary_line(&self) -> String {
        match self {
            Report::Scan(report) => format!("scan: {} items; {}", report.items.len(), report.summary),
            Report::Wipe(report) => format!(
                "wipe: {}; {}",
                if report.success { "complete" } else { "incomplete" },
                report
            ),
            Report::Mutation { action, summary } => format!("{action}: {summary}"),
            Report::Export(report) if !report.dropped_columns.is_empty() => format!(
                "export-csv: {} rows to {}, columns not exported: {}; {}",
                report.summary.items_written,
                report.path.display(),
                report.dropped_columns.join(", "),
                report.summary
            ),
            Report::Export(report) => format!(
                "export-csv: {} rows to {}; {}",
                report.summary.items_written,
                report.path.display(),
                report.summary
            ),
            Report::Item(_) => "item found".to_string(),
            Report::Done(message) => message.clone(),
            Report::Declined => "aborted, nothing was changed".to_string(),
        }
    }

    /// Write the command's output, e.g. scanned items as JSON lines
    pub fn render(&self, out: &mut impl Write) -> io::Result<()> {
        match self {
            Report::Scan(report) => {
                for item in &report.items {
                    writeln!(out, "{}", record_to_json(item))?;
                }
                for (value, count) in report.ranked_clusters() {
                    writeln!(out, "{value}: {count}")?;
                }
            }
            Report::Item(item) => writeln!(out, "{:#}", record_to_json(item))?,
            Report::Wipe(_)
            | Report::Mutation { .. }
            | Report::Export(_)
            | Report::Done(_)
            | Report::Declined => {}
        }
        Ok(())
    }
}

fn mutator(
    args: &MutationArgs,
    default_delay: Duration,
    policy: RecordErrorPolicy,
    cancel: &CancellationToken,
) -> PagedMutator {
    let options = args
        .options(default_delay)
        .with_record_error_policy(policy);
    PagedMutator::new(options).with_cancellation(cancel.clone())
}

/// Pause between batches for commands that write to a table
const TABLE_WRITE_DELAY: Duration = Duration::from_millis(100);

/// Run `command`
///
/// `store` serves every command; `dest` is the destination of `migrate`. Destructive
/// commands ask `confirm` first unless `--force` was given and return
/// [`Report::Declined`] without touching the table when refused.
pub async fn execute<S, D, C>(
    command: &Command,
    store: &S,
    dest: &D,
    confirm: &mut C,
    cancel: &CancellationToken,
) -> Result<Report, Error>
where
    S: TableStore,
    D: TableStore,
    C: Confirm + ?Sized,
{
    match command {
        Command::Scan {
            table,
            cluster_by,
            last_days,
            date_field,
            mutation,
        } => {
            let filter = match last_days {
                Some(days) => Transform::NewerThan {
                    field: date_field.clone(),
                    cutoff: ops::cutoff_for_last_days(*days, chrono::Utc::now()),
                },
                None => Transform::Copy,
            };
            let mutator = mutator(mutation, Duration::ZERO, RecordErrorPolicy::Skip, cancel);
            let report =
                ops::scan_table(store, table, &filter, cluster_by.as_deref(), &mutator).await?;
            Ok(Report::Scan(report))
        }

        Command::Wipe {
            table,
            partition_key,
            settle_ms,
            force,
            mutation,
        } => {
            let message = format!("This will delete ALL items from table '{table}'.");
            if !*force && !confirm.confirm(&message) {
                return Ok(Report::Declined);
            }
            let mutator = mutator(mutation, TABLE_WRITE_DELAY, RecordErrorPolicy::Skip, cancel);
            let report = ops::wipe_table(
                store,
                table,
                partition_key.as_deref(),
                Duration::from_millis(*settle_ms),
                &mutator,
            )
            .await?;
            Ok(Report::Wipe(report))
        }

        Command::Migrate {
            source_table,
            dest_table,
            mutation,
            ..
        } => {
            let mutator = mutator(mutation, TABLE_WRITE_DELAY, RecordErrorPolicy::Skip, cancel);
            let summary =
                ops::migrate_table(store, source_table, dest, dest_table, &mutator).await?;
            Ok(Report::Mutation {
                action: "migrate",
                summary,
            })
        }

        Command::ImportCsv {
            table,
            file,
            types,
            fail_fast,
            mutation,
        } => {
            let policy = if *fail_fast {
                RecordErrorPolicy::Abort
            } else {
                RecordErrorPolicy::Skip
            };
            let mutator = mutator(mutation, TABLE_WRITE_DELAY, policy, cancel);
            let hints = types.iter().cloned().collect();
            let summary = ops::import_csv(store, table, file, hints, &mutator).await?;
            Ok(Report::Mutation {
                action: "import-csv",
                summary,
            })
        }

        Command::ImportJson {
            table,
            file,
            layout,
            keep,
            skip_errors,
            mutation,
        } => {
            let policy = if *skip_errors {
                RecordErrorPolicy::Skip
            } else {
                RecordErrorPolicy::Abort
            };
            let mutator = mutator(mutation, TABLE_WRITE_DELAY, policy, cancel);
            let keep = (!keep.is_empty()).then(|| keep.clone());
            let summary =
                ops::import_json(store, table, file, (*layout).into(), keep, &mutator).await?;
            Ok(Report::Mutation {
                action: "import-json",
                summary,
            })
        }

        Command::ExportCsv {
            table,
            file,
            mutation,
        } => {
            let mutator = mutator(mutation, Duration::ZERO, RecordErrorPolicy::Skip, cancel);
            let report = ops::export_csv(store, table, file, &mutator).await?;
            Ok(Report::Export(report))
        }

        Command::RemoveColumn {
            table,
            column,
            force,
            mutation,
        } => {
            let message =
                format!("This will remove '{column}' from every item in table '{table}'.");
            if !*force && !confirm.confirm(&message) {
                return Ok(Report::Declined);
            }
            let mutator = mutator(mutation, TABLE_WRITE_DELAY, RecordErrorPolicy::Skip, cancel);
            let summary = ops::remove_column(store, table, column, &mutator).await?;
            Ok(Report::Mutation {
                action: "remove-column",
                summary,
            })
        }

        Command::RenameColumn {
            table,
            from,
            to,
            force,
            mutation,
        } => {
            let message = format!(
                "This will rename '{from}' to '{to}' on every item in table '{table}'."
            );
            if !*force && !confirm.confirm(&message) {
                return Ok(Report::Declined);
            }
            let mutator = mutator(mutation, TABLE_WRITE_DELAY, RecordErrorPolicy::Skip, cancel);
            let summary = ops::rename_column(store, table, from, to, &mutator).await?;
            Ok(Report::Mutation {
                action: "rename-column",
                summary,
            })
        }

        Command::SetValue {
            table,
            pk,
            pk_value,
            pk_type,
            attribute,
            old_value,
            new_value,
            value_type,
        } => {
            let update = ValueUpdate {
                key_name: pk.clone(),
                key_value: pk_type.parse(pk_value)?,
                attribute: attribute.clone(),
                expected: old_value.clone(),
                value: value_type.parse(new_value)?,
            };
            let updated = ops::set_value(store, table, update).await?;
            Ok(Report::Item(updated))
        }

        Command::Get { table, key } => {
            let item = ops::get_item(store, table, key.clone()).await?;
            Ok(Report::Item(item))
        }

        Command::Put { table, item } => {
            ops::put_item(store, table, item.clone()).await?;
            info!(table, "item written");
            Ok(Report::Done(format!("item written to '{table}'")))
        }

        Command::Update {
            table,
            key,
            set,
            remove,
        } => {
            let update = ItemUpdate {
                set: set.clone().unwrap_or_default(),
                remove: remove.clone(),
            };
            let updated = ops::update_item(store, table, key.clone(), update).await?;
            Ok(Report::Item(updated))
        }

        Command::Delete { table, key } => {
            let _ = ops::delete_item(store, table, key.clone()).await?;
            Ok(Report::Done(format!("item deleted from '{table}'")))
        }
    }
}
