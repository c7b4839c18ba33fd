use crate::store::Record;
use serde_json::Value;

/// Keeps only fields a collection can persist.
///
/// Objects and arrays containing objects are inline data from related
/// collections and are dropped. Primitives, `null` and arrays of primitives
/// are kept as is.
pub fn sanitize(record: &Record) -> Record {
    record
        .iter()
        .filter(|(_, v)| is_persistable(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn is_persistable(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => items
            .iter()
            .all(|v| !matches!(v, Value::Object(_) | Value::Array(_))),
        _ => true,
    }
}
