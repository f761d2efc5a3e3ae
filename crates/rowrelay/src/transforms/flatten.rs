//! 🥞 Flatten: nested maps go in, one level comes out.
//!
//! `{"name": {"first": "A"}}` becomes `name_first`. Arrays flatten by index
//! (`tags_0`, `tags_1`). Empty maps and arrays have nothing to say and vanish.

use serde_json::Value;

use crate::common::FieldValue;

/// Path delimiter for flattened keys.
pub(crate) const DELIMITER: char = '_';

/// 📦 One leaf of the row, with both its original path (for error messages) and its joined key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlatField {
    /// Dotted original path, e.g. `userInfo.firstName`.
    pub path: String,
    /// Delimiter-joined key before renaming, e.g. `userInfo_firstName`.
    pub key: String,
    pub value: FieldValue,
}

/// 🔄 Push every leaf under `value` onto `out`, depth first, in encounter order.
pub(crate) fn flatten_value(path: &str, key: &str, value: &Value, out: &mut Vec<FlatField>) {
    match value {
        Value::Object(children) => {
            for (child_key, child) in children {
                flatten_value(
                    &format!("{path}.{child_key}"),
                    &format!("{key}{DELIMITER}{child_key}"),
                    child,
                    out,
                );
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(
                    &format!("{path}.{index}"),
                    &format!("{key}{DELIMITER}{index}"),
                    item,
                    out,
                );
            }
        }
        scalar => out.push(FlatField {
            path: path.to_string(),
            key: key.to_string(),
            value: scalar_value(scalar),
        }),
    }
}

fn scalar_value(value: &Value) -> FieldValue {
    match value {
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Int(i),
            // -- u64 beyond i64::MAX and real floats both land here
            None => n.as_f64().map_or(FieldValue::Null, FieldValue::Float),
        },
        Value::String(s) => FieldValue::Text(s.clone()),
        _ => FieldValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flatten(key: &str, value: Value) -> Vec<(String, String, FieldValue)> {
        let mut out = Vec::new();
        flatten_value(key, key, &value, &mut out);
        out.into_iter().map(|f| (f.path, f.key, f.value)).collect()
    }

    #[test]
    fn the_one_where_nesting_collapses_with_underscores() {
        let leaves = flatten("name", json!({"first": "A", "last": "B"}));
        assert_eq!(
            leaves,
            vec![
                ("name.first".into(), "name_first".into(), FieldValue::from("A")),
                ("name.last".into(), "name_last".into(), FieldValue::from("B")),
            ]
        );
    }

    #[test]
    fn the_one_where_arrays_count_their_children() {
        let leaves = flatten("tags", json!(["vip", {"tier": 2}]));
        assert_eq!(
            leaves,
            vec![
                ("tags.0".into(), "tags_0".into(), FieldValue::from("vip")),
                ("tags.1.tier".into(), "tags_1_tier".into(), FieldValue::Int(2)),
            ]
        );
    }

    #[test]
    fn the_one_where_empty_containers_quietly_disappear() {
        assert!(flatten("nothing", json!({})).is_empty());
        assert!(flatten("nada", json!([])).is_empty());
    }

    #[test]
    fn the_one_where_scalars_keep_their_types() {
        assert_eq!(flatten("n", json!(7))[0].2, FieldValue::Int(7));
        assert_eq!(flatten("f", json!(1.5))[0].2, FieldValue::Float(1.5));
        assert_eq!(flatten("b", json!(true))[0].2, FieldValue::Bool(true));
        assert_eq!(flatten("z", Value::Null)[0].2, FieldValue::Null);
        assert_eq!(flatten("big", json!(u64::MAX))[0].2, FieldValue::Float(u64::MAX as f64));
    }
}
