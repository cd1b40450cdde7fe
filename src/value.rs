use serde_json::{json, Map, Value};

use crate::{MongoHttpError, Result};

/// A JSON object as sent to and returned by the API service.
pub type Document = Map<String, Value>;

/// Builds a document from key/value pairs.
pub fn document<I, K, V>(pairs: I) -> Document
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Extended-JSON ObjectId: `{"$oid": "<24 hex chars>"}`.
pub fn object_id(hex: &str) -> Result<Value> {
    if !is_object_id(hex) {
        return Err(MongoHttpError::Validation(format!(
            "invalid ObjectId '{hex}': expected 24 hex characters"
        )));
    }
    Ok(json!({ "$oid": hex.to_ascii_lowercase() }))
}

/// Extended-JSON date from Unix milliseconds: `{"$date": <millis>}`.
pub fn date_millis(millis: i64) -> Value {
    json!({ "$date": millis })
}

/// Returns the hex string of an ObjectId value.
///
/// Accepts both the `{"$oid": ...}` form and a bare 24-char hex string.
pub fn parse_object_id(value: &Value) -> Option<&str> {
    let hex = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("$oid")?.as_str()?,
        _ => return None,
    };
    is_object_id(hex).then_some(hex)
}

/// Returns Unix milliseconds of a `{"$date": ...}` value.
///
/// Accepts a numeric payload, `{"$numberLong": "..."}`, or an RFC 3339 string.
pub fn parse_date_millis(value: &Value) -> Option<i64> {
    let inner = value.as_object()?.get("$date")?;
    match inner {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        Value::Object(map) => map.get("$numberLong")?.as_str()?.parse().ok(),
        _ => None,
    }
}

fn is_object_id(hex: &str) -> bool {
    hex.len() == 24 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}
