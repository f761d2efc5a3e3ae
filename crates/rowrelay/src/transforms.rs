//! 🔄 Transforms: the row normalizer. 🎭
//!
//! 🎬 COLD OPEN - INT. SPREADSHEET - MONDAY MORNING
//!
//! Someone in marketing exported a CSV. The headers say `Full Name`, `userInfo.plan`,
//! and `createdAt`. The remote API wants `full_name`, `user_info_plan`, and a real
//! timestamp. Nobody in marketing will ever know this module exists. That's the job.
//!
//! ## Pipeline, per row 🧠
//!
//! ```text
//!   RawRow ──▶ timestamps (createdAt, timestamp) ──▶ flatten (`_`) ──▶ snake_case ──▶ Record
//!                                                                 └─▶ collision? ──▶ TransformError
//! ```
//!
//! - Pure functions. The row is borrowed, never mutated.
//! - Key order follows encounter order, depth first.
//! - Two different source paths normalizing to the same key is an error, not a coin flip.
//!   `{"fullName": .., "full_name": ..}` would otherwise lose one of them silently.
//!
//! 🦆

pub(crate) mod flatten;
mod snake_case;
mod timestamps;

use std::collections::HashMap;

use serde_json::Value;

use crate::common::{QueuedRecord, RawRow, Record};
use crate::error::TransformError;
use flatten::{FlatField, flatten_value};

pub(crate) use snake_case::to_snake_case;

/// Field that carries an object's identifier for the generic `object_` kind.
pub const OBJECT_ID_FIELD: &str = "id";

/// 📦 Normalize one row into a flat, snake_cased [`Record`].
///
/// ```ignore
/// let record = transform_row(&json!({"name": {"first": "A"}}).as_object().unwrap())?;
/// assert_eq!(record.get("name_first"), Some(&FieldValue::from("A")));
/// ```
pub fn transform_row(row: &RawRow) -> Result<Record, TransformError> {
    normalize(row, None)
}

/// 🗃️ Normalize an object row: pull out `id` as the side-channel identifier, then
/// normalize everything else. The id never shows up in the properties.
pub fn transform_object_row(row: &RawRow) -> Result<QueuedRecord, TransformError> {
    let id = match row.get(OBJECT_ID_FIELD) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(TransformError::MissingObjectId),
    };
    let fields = normalize(row, Some(OBJECT_ID_FIELD))?;
    Ok(QueuedRecord::with_id(id, fields))
}

fn normalize(row: &RawRow, skip: Option<&str>) -> Result<Record, TransformError> {
    let mut leaves: Vec<FlatField> = Vec::with_capacity(row.len());
    for (key, value) in row {
        if skip == Some(key.as_str()) {
            continue;
        }
        if timestamps::TIMESTAMP_FIELDS.contains(&key.as_str()) {
            // -- ⏰ dates are parsed before flattening and never descend further
            leaves.push(FlatField {
                path: key.clone(),
                key: key.clone(),
                value: timestamps::parse_timestamp(key, value)?,
            });
        } else {
            flatten_value(key, key, value, &mut leaves);
        }
    }

    let mut seen: HashMap<String, String> = HashMap::with_capacity(leaves.len());
    let mut record = Record::new();
    for leaf in leaves {
        let normalized = to_snake_case(&leaf.key);
        if let Some(first) = seen.get(&normalized) {
            return Err(TransformError::KeyCollision {
                key: normalized,
                first: first.clone(),
                second: leaf.path,
            });
        }
        seen.insert(normalized.clone(), leaf.path);
        record.push(normalized, leaf.value);
    }
    Ok(record)
}
