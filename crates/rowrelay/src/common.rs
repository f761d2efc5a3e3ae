//! 📦 Common data structures: the building blocks of rowrelay.
//!
//! A row walks in nested and camelCased. It walks out as a [`Record`]: flat, ordered,
//! snake_cased, with its timestamps finally wearing real types. Somewhere in between
//! it picks up a [`DestinationKey`] telling the queue which buffer it lives in.
//!
//! 🦆

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// 📄 A decoded row before normalization: ordered, possibly nested, all opinions intact.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// 🎯 A single scalar (or date) inside a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// ⏰ Serialized as RFC 3339 with millisecond precision, always `Z`.
    Timestamp(DateTime<Utc>),
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Int(i) => serializer.serialize_i64(*i),
            FieldValue::Float(f) => serializer.serialize_f64(*f),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// 📦 A flat, ordered mapping from key to [`FieldValue`].
///
/// A `Vec` of pairs rather than a map: records are small, order is part of the
/// contract, and the transformer wants to see collisions instead of having a
/// map quietly eat one side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field. Callers that care about duplicate keys check [`Record::contains_key`] first.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.push(k, v);
        }
        record
    }
}

/// 📬 What actually sits in the queue: the normalized fields plus the object id side channel.
///
/// `id` is only populated for the generic `object_` kind. It travels next to the
/// properties, never inside them.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRecord {
    pub id: Option<String>,
    pub fields: Record,
}

impl QueuedRecord {
    pub fn new(fields: Record) -> Self {
        Self { id: None, fields }
    }

    pub fn with_id(id: impl Into<String>, fields: Record) -> Self {
        Self {
            id: Some(id.into()),
            fields,
        }
    }
}

const COLLECTION_PREFIX: &str = "collection:";

/// 🗂️ Names one buffer in the queue: a fixed event kind (`track`) or `collection:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationKey(String);

impl DestinationKey {
    /// 🏷️ A fixed-kind bucket, e.g. `identify`.
    pub fn fixed(kind: &str) -> Self {
        Self(kind.to_string())
    }

    /// 🗃️ A generic collection bucket, e.g. `collection:accounts`.
    pub fn collection(name: &str) -> Self {
        Self(format!("{COLLECTION_PREFIX}{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Some("accounts")` for `collection:accounts`, `None` for fixed kinds.
    pub fn collection_name(&self) -> Option<&str> {
        self.0.strip_prefix(COLLECTION_PREFIX)
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn the_one_where_records_serialize_in_the_order_they_were_built() -> anyhow::Result<()> {
        let mut record = Record::new();
        record.push("zeta", "last letter, first field");
        record.push("alpha", FieldValue::Int(1));
        record.push("created_at", FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()));
        record.push("gone", FieldValue::Null);

        let json = serde_json::to_string(&record)?;
        assert_eq!(
            json,
            r#"{"zeta":"last letter, first field","alpha":1,"created_at":"2024-01-02T03:04:05.000Z","gone":null}"#
        );
        Ok(())
    }

    #[test]
    fn the_one_where_collection_keys_remember_their_name() {
        let key = DestinationKey::collection("accounts");
        assert_eq!(key.as_str(), "collection:accounts");
        assert_eq!(key.collection_name(), Some("accounts"));
        assert_eq!(DestinationKey::fixed("track").collection_name(), None);
        assert_eq!(DestinationKey::fixed("track").to_string(), "track");
    }
}
