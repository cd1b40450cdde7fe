use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Document, FindOptions};

#[derive(Debug, Serialize)]
pub struct CreateConnectionBody<'a> {
    pub uri: &'a str,
}

#[derive(Debug, Serialize)]
pub struct InsertOneBody<'a> {
    pub document: &'a Document,
}

#[derive(Debug, Serialize)]
pub struct InsertManyBody<'a> {
    pub documents: &'a [Document],
}

#[derive(Debug, Serialize)]
pub struct FilterBody<'a> {
    pub filter: &'a Document,
}

#[derive(Debug, Serialize)]
pub struct FindBody<'a> {
    pub filter: &'a Document,
    #[serde(skip_serializing_if = "no_options")]
    pub options: &'a FindOptions,
}

fn no_options(options: &&FindOptions) -> bool {
    options.is_empty()
}

#[derive(Debug, Serialize)]
pub struct UpdateBody<'a> {
    pub filter: &'a Document,
    pub update: &'a Document,
}

#[derive(Debug, Serialize)]
pub struct IndexBody<'a> {
    pub keys: &'a Document,
    pub options: &'a Document,
}

/// `{"success": bool, "data": <value>|null, "error": <string>, ...}`
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    /// Compound verbs may carry their counters next to `data`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Error text reported by the service, if any.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(message) => Some(message.clone()),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or_else(|| Some(Value::Object(map.clone()).to_string())),
            other => Some(other.to_string()),
        }
    }

    /// Looks a field up inside `data` first, then at the envelope's top level.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data
            .as_ref()
            .and_then(|data| data.get(name))
            .or_else(|| self.extra.get(name))
            .filter(|value| !value.is_null())
    }
}
