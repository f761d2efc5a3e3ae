//! 💀 Errors: the taxonomy of things that go wrong between a CSV file and the remote API.
//!
//! 🧠 Knowledge graph:
//! - `ClassificationError`: the file name matched no known prefix. Fatal for the file.
//! - `TransformError`: one row could not be normalized. Fatal for the row, not the file.
//! - `DecodeError`: the bytes were not a CSV we understand. Fatal for the file.
//! - `TransportError`: a batch did not land. Shared by every record in that batch.
//! - `ConfigurationError`: no write key, no party. Fatal before anything starts.
//! - `QueueError`: records were still buffered when the queue closed. A dropped delivery.
//! - `PipelineError`: the per-file roll-up the trigger gets to see.
//!
//! Library seams speak `thiserror`. The binary wraps everything in `anyhow` context
//! and prints the whole onion. 🧅

use thiserror::Error;

use crate::common::DestinationKey;

/// 🏷️ The source name did not start with any prefix we know how to route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error(
        "source '{source_name}' has no recognized prefix; expected one of 'identify_', 'track_', \
         'page_', 'screen_', 'group_', 'alias_' or 'object_<collection>'"
    )]
    UnrecognizedPrefix { source_name: String },
    #[error("source '{source_name}' uses the 'object_' prefix but names no collection")]
    MissingCollection { source_name: String },
}

/// 🔄 A single row refused to be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("field '{field}' holds '{value}', which is not a recognizable date/time")]
    InvalidTimestamp { field: String, value: String },
    #[error("fields '{first}' and '{second}' both normalize to key '{key}'")]
    KeyCollision {
        key: String,
        first: String,
        second: String,
    },
    #[error("object rows need a non-empty scalar 'id' field")]
    MissingObjectId,
}

/// 📄 The tabular blob could not be decoded into rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("input is not valid UTF-8 (first bad byte at offset {offset})")]
    InvalidUtf8 { offset: usize },
    #[error("input has no header row")]
    MissingHeader,
    #[error("line {line}: unterminated quoted field")]
    UnterminatedQuote { line: usize },
    #[error("line {line}: {found} cells but only {expected} header columns")]
    TooManyFields {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("header column '{column}' clashes with another nested column path")]
    ConflictingHeader { column: String },
}

/// 📡 A batch did not make it. `Clone` because every record in the batch gets the same verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 🚫 The remote looked at the payload and said no. Not retried.
    #[error("remote rejected batch with status {status}: {message}")]
    Rejected { status: u16, message: String },
    /// 🔄 One attempt failed in a way worth retrying (network error, 5xx).
    #[error("attempt failed: {message}")]
    Unavailable { status: Option<u16>, message: String },
    /// 💀 Every attempt failed transiently and we ran out of patience.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    /// 📦 The payload could not even be serialized.
    #[error("could not encode batch payload: {0}")]
    Encode(String),
    /// 🧨 The delivery task died before it could report (panic or runtime shutdown).
    #[error("delivery task aborted: {0}")]
    Aborted(String),
}

impl TransportError {
    /// 🔁 Network errors and 5xx responses earn another attempt. Everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unavailable { .. })
    }
}

/// 🔧 Startup could not produce a usable configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no write key configured; set ROWRELAY_WRITE_KEY, write_key, or 'write_key' in the config file")]
    MissingWriteKey,
    #[error("invalid configuration: {0}")]
    Invalid(#[from] figment::Error),
}

/// 🗑️ The queue was closed while records were still waiting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("{count} record(s) still buffered for '{destination}' at close")]
    Undelivered {
        destination: DestinationKey,
        count: usize,
    },
}

/// ❌ One row that did not make it into the queue, with its 1-based position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub row: usize,
    pub error: TransformError,
}

/// 📡 One batch that did not make it, and where it was headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub destination: DestinationKey,
    pub batch_size: usize,
    pub error: TransportError,
}

/// 📋 Why a whole file is reported as failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("{} batch(es) failed: {}", .0.len(), describe_deliveries(.0))]
    Delivery(Vec<DeliveryFailure>),
    #[error("{} row(s) were rejected: {}", .0.len(), describe_rows(.0))]
    Rows(Vec<RowFailure>),
}

fn describe_deliveries(failures: &[DeliveryFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {} record(s): {}", f.destination, f.batch_size, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_rows(failures: &[RowFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("row {}: {}", f.row, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_only_unavailable_gets_a_second_chance() {
        let flaky = TransportError::Unavailable {
            status: Some(503),
            message: "503 Service Unavailable".into(),
        };
        let rude = TransportError::Rejected {
            status: 400,
            message: "bad payload".into(),
        };
        let tired = TransportError::RetriesExhausted {
            attempts: 3,
            last_error: "timeout".into(),
        };
        assert!(flaky.is_transient());
        assert!(!rude.is_transient());
        assert!(!tired.is_transient());
        assert!(!TransportError::Encode("nope".into()).is_transient());
    }

    #[test]
    fn the_one_where_delivery_failures_name_their_destination() {
        let err = PipelineError::Delivery(vec![DeliveryFailure {
            destination: DestinationKey::collection("accounts"),
            batch_size: 2,
            error: TransportError::Rejected {
                status: 400,
                message: "nope".into(),
            },
        }]);
        let rendered = err.to_string();
        assert!(rendered.contains("collection:accounts"), "{rendered}");
        assert!(rendered.contains("2 record(s)"), "{rendered}");
        assert!(rendered.contains("nope"), "{rendered}");
    }
}
