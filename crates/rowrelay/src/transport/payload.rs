//! 📦 Wire payloads: what a batch looks like once it is JSON.
//!
//! ```text
//!   track            ──▶ {"batch":[{"type":"track", ...record}], "sentAt":"…"}
//!   collection:users ──▶ {"collection":"users","objects":[{"id":"…","properties":{…}}]}
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::common::{DestinationKey, QueuedRecord};
use crate::error::TransportError;

/// 🔧 Build the request body for one batch. Pure: same inputs, same bytes.
pub fn build_payload(
    destination: &DestinationKey,
    records: &[QueuedRecord],
    sent_at: DateTime<Utc>,
) -> Result<Value, TransportError> {
    match destination.collection_name() {
        Some(collection) => object_payload(collection, records),
        None => event_payload(destination.as_str(), records, sent_at),
    }
}

fn event_payload(
    kind: &str,
    records: &[QueuedRecord],
    sent_at: DateTime<Utc>,
) -> Result<Value, TransportError> {
    let mut batch = Vec::with_capacity(records.len());
    for record in records {
        let mut message = Map::with_capacity(record.fields.len() + 1);
        message.insert("type".to_string(), Value::String(kind.to_string()));
        for (key, value) in record.fields.iter() {
            // -- 🏷️ the kind is ours to set; a column literally named `type` does not get a vote
            if key == "type" {
                continue;
            }
            message.insert(key.to_string(), encode(value)?);
        }
        batch.push(Value::Object(message));
    }
    Ok(json!({
        "batch": batch,
        "sentAt": sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

fn object_payload(collection: &str, records: &[QueuedRecord]) -> Result<Value, TransportError> {
    let mut objects = Vec::with_capacity(records.len());
    for record in records {
        let id = record.id.as_deref().ok_or_else(|| {
            TransportError::Encode(format!("object bound for '{collection}' has no id"))
        })?;
        objects.push(json!({
            "id": id,
            "properties": encode(&record.fields)?,
        }));
    }
    Ok(json!({
        "collection": collection,
        "objects": objects,
    }))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, TransportError> {
    serde_json::to_value(value).map_err(|e| TransportError::Encode(e.to_string()))
}
