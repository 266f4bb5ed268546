//! Per-record transforms

use aws_sdk_dynamodb::types::AttributeValue;

use crate::error::Error;
use crate::record::{KeySchema, Record};

/// Per-record step of a mutation
///
/// `Ok(None)` drops the record and counts it as skipped; `Err` is a per-record error
/// handled by the run's record error policy.
pub trait RecordTransform {
    /// Transform one record
    fn apply(&self, record: Record) -> Result<Option<Record>, Error>;
}

impl<F> RecordTransform for F
where
    F: Fn(Record) -> Result<Option<Record>, Error>,
{
    fn apply(&self, record: Record) -> Result<Option<Record>, Error> {
        self(record)
    }
}

/// Built-in transforms
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Pass records through unchanged
    Copy,
    /// Remove an attribute; records without it are skipped
    DropColumn(String),
    /// Move an attribute to a new name; records without it are skipped
    RenameColumn {
        /// Current attribute name
        from: String,
        /// New attribute name
        to: String,
    },
    /// Reduce each record to its primary key
    DeleteKey(KeySchema),
    /// Prepare a record read from a file, optionally keeping only the listed attributes
    FileIngest {
        /// Attributes to keep; `None` keeps everything
        keep: Option<Vec<String>>,
    },
    /// Keep records whose string attribute sorts after `cutoff`
    ///
    /// Works for ISO-8601 timestamps, which sort lexicographically.
    NewerThan {
        /// Attribute holding the timestamp
        field: String,
        /// Exclusive lower bound
        cutoff: String,
    },
}

impl RecordTransform for Transform {
    fn apply(&self, mut record: Record) -> Result<Option<Record>, Error> {
        match self {
            Transform::Copy => Ok(Some(record)),
            Transform::DropColumn(column) => Ok(record.remove(column).map(|_| record)),
            Transform::RenameColumn { from, to } => match record.remove(from) {
                Some(value) => {
                    let _ = record.insert(to.clone(), value);
                    Ok(Some(record))
                }
                None => Ok(None),
            },
            Transform::DeleteKey(schema) => schema.key_of(&record).map(Some),
            Transform::FileIngest { keep } => {
                if let Some(keep) = keep {
                    record.retain(|name, _| keep.iter().any(|k| k == name));
                }
                if record.is_empty() {
                    return Err(Error::MalformedInput(
                        "record has no attributes to write".to_string(),
                    ));
                }
                Ok(Some(record))
            }
            Transform::NewerThan { field, cutoff } => match record.get(field) {
                Some(AttributeValue::S(value)) if value.as_str() > cutoff.as_str() => {
                    Ok(Some(record))
                }
                _ => Ok(None),
            },
        }
    }
}
