use aws_sdk_dynamodb::error::{BuildError, ProvideErrorMetadata};
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use serde_dynamo::Error as SerdeDynamoError;
use std::error::Error as StdError;
use std::fmt;

type DynamoPutError = SdkError<PutItemError, Response>;
type DynamoUpdateError = SdkError<UpdateItemError, Response>;
type DynamoGetError = SdkError<GetItemError, Response>;
type DynamoScanError = SdkError<ScanError, Response>;
type DynamoDeleteItemError = SdkError<DeleteItemError, Response>;
type DynamoDescribeTableError = SdkError<DescribeTableError, Response>;
type DynamoCreateTableError = SdkError<CreateTableError, Response>;
type DynamoBatchWriteItemError = SdkError<BatchWriteItemError, Response>;
type IoError = std::io::Error;
type CsvError = csv::Error;
type JsonError = serde_json::Error;

/// Service error codes DynamoDB uses to signal that the caller exceeded its request rate.
const THROTTLING_CODES: [&str; 5] = [
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "Throttling",
    "LimitExceededException",
];

/// Table operation error
#[derive(Debug)]
pub enum Error {
    /// Serde DynamoDB serialization/deserialization error
    SerdeDynamo(SerdeDynamoError),
    /// DynamoDB request builder error
    BuildError(BuildError),
    /// DynamoDB PutItem operation error
    DynamoPutError(DynamoPutError),
    /// DynamoDB GetItem operation error
    DynamoGetError(DynamoGetError),
    /// DynamoDB Scan operation error
    DynamoScanError(DynamoScanError),
    /// DynamoDB UpdateItem operation error
    DynamoUpdateError(DynamoUpdateError),
    /// DynamoDB DeleteItem operation error
    DynamoDeleteItemError(DynamoDeleteItemError),
    /// DynamoDB DescribeTable operation error
    DynamoDescribeTableError(DynamoDescribeTableError),
    /// DynamoDB CreateTable operation error
    DynamoCreateTableError(DynamoCreateTableError),
    /// DynamoDB BatchWriteItem operation error
    DynamoBatchWriteItemError(DynamoBatchWriteItemError),
    /// The referenced table does not exist
    TableNotFound(String),
    /// The referenced item does not exist
    ItemNotFound {
        /// Table that was searched
        table: String,
        /// Rendered primary key of the missing item
        key: String,
    },
    /// Caller-supplied schema or expected value disagrees with the store
    SchemaMismatch(String),
    /// The store rejected the request because the request rate was exceeded
    Throttled {
        /// Table the request targeted
        table: String,
        /// Message returned by the store
        message: String,
    },
    /// The request timed out before the store answered
    Timeout(String),
    /// The store refused a whole batch as invalid
    BatchRejected {
        /// Table the batch targeted
        table: String,
        /// Message returned by the store
        message: String,
    },
    /// An input record could not be parsed or lacks a required attribute
    MalformedInput(String),
    /// A command-line value could not be converted to the requested type
    InvalidValue(String),
    /// Local file I/O error
    Io(IoError),
    /// CSV read/write error
    Csv(CsvError),
    /// JSON parse/serialize error
    Json(JsonError),
}

impl Error {
    /// Check whether retrying the same request later may succeed
    ///
    /// Throttling and timeouts are retryable; everything else is either permanent or a
    /// precondition failure that retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Throttled { .. } | Error::Timeout(_))
    }

    /// Check if the error reports a missing table or item
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TableNotFound(_) | Error::ItemNotFound { .. })
    }

    /// Check if the error is a schema or expected-value mismatch
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Error::SchemaMismatch(_))
    }

    /// Check if the error was caused by a single bad input record
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Error::MalformedInput(_))
    }

    /// Check if the error is a serialization/deserialization error
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::SerdeDynamo(_) | Error::Json(_))
    }

    /// Classify an SDK error returned for an operation against `table`
    ///
    /// Missing tables, throttling and timeouts are mapped to their domain variants so the
    /// caller can act on them; all other errors keep their typed per-operation variant.
    pub(crate) fn from_sdk<E>(err: SdkError<E, Response>, table: &str) -> Self
    where
        E: ProvideErrorMetadata + StdError + 'static,
        Error: From<SdkError<E, Response>>,
    {
        let code = err.as_service_error().and_then(|e| e.code());
        match code {
            Some("ResourceNotFoundException") => return Error::TableNotFound(table.to_string()),
            Some(code) if THROTTLING_CODES.contains(&code) => {
                let message = err
                    .as_service_error()
                    .and_then(|e| e.message())
                    .unwrap_or(code)
                    .to_string();
                return Error::Throttled {
                    table: table.to_string(),
                    message,
                };
            }
            _ => {}
        }

        let timed_out = match &err {
            SdkError::TimeoutError(_) => true,
            SdkError::DispatchFailure(failure) => failure.is_timeout(),
            _ => false,
        };
        if timed_out {
            return Error::Timeout(format!("request to table '{table}' timed out"));
        }

        err.into()
    }
}

macro_rules! impl_from_error {
    ($name:ident, $variant:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$variant(e)
            }
        }
    };
    ($name:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$name(e)
            }
        }
    };
}

impl_from_error!(SerdeDynamoError, SerdeDynamo);
impl_from_error!(BuildError);
impl_from_error!(DynamoPutError);
impl_from_error!(DynamoGetError);
impl_from_error!(DynamoUpdateError);
impl_from_error!(DynamoScanError);
impl_from_error!(DynamoDeleteItemError);
impl_from_error!(DynamoDescribeTableError);
impl_from_error!(DynamoCreateTableError);
impl_from_error!(DynamoBatchWriteItemError);
impl_from_error!(IoError, Io);
impl_from_error!(CsvError, Csv);
impl_from_error!(JsonError, Json);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerdeDynamo(e) => write!(f, "DynamoDB serialization error: {}", e),
            Error::BuildError(e) => write!(f, "DynamoDB request builder error: {}", e),
            Error::DynamoPutError(e) => {
                write!(f, "DynamoDB PutItem operation failed: {}", e)
            }
            Error::DynamoGetError(e) => {
                write!(f, "DynamoDB GetItem operation failed: {}", e)
            }
            Error::DynamoScanError(e) => {
                write!(f, "DynamoDB Scan operation failed: {}", e)
            }
            Error::DynamoUpdateError(e) => {
                write!(f, "DynamoDB UpdateItem operation failed: {}", e)
            }
            Error::DynamoDeleteItemError(e) => {
                write!(f, "DynamoDB DeleteItem operation failed: {}", e)
            }
            Error::DynamoDescribeTableError(e) => {
                write!(f, "DynamoDB DescribeTable operation failed: {}", e)
            }
            Error::DynamoCreateTableError(e) => {
                write!(f, "DynamoDB CreateTable operation failed: {}", e)
            }
            Error::DynamoBatchWriteItemError(e) => {
                write!(f, "DynamoDB BatchWriteItem operation failed: {}", e)
            }
            Error::TableNotFound(table) => write!(f, "table '{}' does not exist", table),
            Error::ItemNotFound { table, key } => {
                write!(f, "item {} not found in table '{}'", key, table)
            }
            Error::SchemaMismatch(msg) => write!(f, "schema mismatch: {}", msg),
            Error::Throttled { table, message } => {
                write!(f, "request to table '{}' was throttled: {}", table, message)
            }
            Error::Timeout(msg) => write!(f, "{}", msg),
            Error::BatchRejected { table, message } => {
                write!(f, "batch rejected by table '{}': {}", table, message)
            }
            Error::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
            Error::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Csv(e) => write!(f, "CSV error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::SerdeDynamo(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Csv(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}
