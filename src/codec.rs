use serde::Serialize;
use serde_json::Value;

use crate::{
    wire::{
        CreateConnectionBody, Envelope, FilterBody, FindBody, IndexBody, InsertManyBody,
        InsertOneBody, UpdateBody,
    },
    Document, MongoHttpError, Operation, Result, UpdateResult,
};

/// Outcome of a response envelope with `"success": true`.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// The operation produced a payload.
    Data(Envelope),
    /// The operation succeeded with no result, e.g. an empty find-one.
    NoResult,
}

/// Renders `value` as a JSON string literal, quotes included.
///
/// Request bodies are serialized by the same `serde_json` string writer, so a
/// value containing quotes, backslashes or control characters cannot break
/// out of its literal.
pub fn escape_string(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

/// Renders the request body for `operation`, or `None` for bodiless verbs.
pub fn encode(operation: &Operation) -> Result<Option<String>> {
    match operation {
        Operation::CreateConnection { uri } => to_body(&CreateConnectionBody { uri }),
        Operation::InsertOne { document } => to_body(&InsertOneBody { document }),
        Operation::InsertMany { documents } => to_body(&InsertManyBody { documents }),
        Operation::FindOne { filter }
        | Operation::DeleteOne { filter }
        | Operation::DeleteMany { filter }
        | Operation::Count { filter } => to_body(&FilterBody { filter }),
        Operation::Find { filter, options } => to_body(&FindBody { filter, options }),
        Operation::UpdateOne { filter, update } | Operation::UpdateMany { filter, update } => {
            to_body(&UpdateBody { filter, update })
        }
        Operation::CreateIndex { keys, options } => to_body(&IndexBody { keys, options }),
        Operation::CloseConnection
        | Operation::Ping
        | Operation::DropIndex { .. }
        | Operation::ListIndexes => Ok(None),
    }
}

fn to_body<T: Serialize>(body: &T) -> Result<Option<String>> {
    serde_json::to_string(body)
        .map(Some)
        .map_err(|err| MongoHttpError::Validation(format!("request body is not encodable: {err}")))
}

/// Parses a response body into its structured outcome.
///
/// `"success": false` becomes [`MongoHttpError::Api`]; malformed JSON or a
/// missing `success` flag becomes [`MongoHttpError::Protocol`].
pub fn decode(body: &str) -> Result<Decoded> {
    let envelope = serde_json::from_str::<Envelope>(body).map_err(|err| {
        MongoHttpError::Protocol(format!("invalid response JSON: {err}; body: {body}"))
    })?;

    if !envelope.success {
        return Err(MongoHttpError::Api {
            message: envelope
                .error_message()
                .unwrap_or_else(|| "operation failed".to_owned()),
        });
    }

    let has_payload = envelope.data.as_ref().is_some_and(|data| !data.is_null())
        || !envelope.extra.is_empty();
    if has_payload {
        Ok(Decoded::Data(envelope))
    } else {
        Ok(Decoded::NoResult)
    }
}

impl Decoded {
    fn envelope(&self, what: &str) -> Result<&Envelope> {
        match self {
            Self::Data(envelope) => Ok(envelope),
            Self::NoResult => Err(MongoHttpError::Protocol(format!(
                "response carries no data, expected {what}"
            ))),
        }
    }

    fn required(&self, field: &str) -> Result<&Value> {
        self.envelope(field)?
            .field(field)
            .ok_or_else(|| MongoHttpError::Protocol(format!("missing field '{field}'")))
    }

    fn required_u64(&self, field: &str) -> Result<u64> {
        let value = self.required(field)?;
        value.as_u64().ok_or_else(|| {
            MongoHttpError::Protocol(format!(
                "field '{field}' must be a non-negative integer, got {value}"
            ))
        })
    }

    /// `data` as a document, `None` for the explicit no-result outcome.
    pub fn document(self) -> Result<Option<Document>> {
        match self {
            Self::NoResult => Ok(None),
            Self::Data(envelope) => match envelope.data {
                Some(Value::Object(document)) => Ok(Some(document)),
                None | Some(Value::Null) => Ok(None),
                Some(other) => Err(MongoHttpError::Protocol(format!(
                    "expected document in 'data', got {other}"
                ))),
            },
        }
    }

    /// `data` as an array of documents; no result is an empty list.
    ///
    /// Also accepts `{"documents": [...]}` for services that wrap find results.
    pub fn documents(self) -> Result<Vec<Document>> {
        let items = match self {
            Self::NoResult => return Ok(Vec::new()),
            Self::Data(envelope) => match envelope.data {
                Some(Value::Array(items)) => items,
                Some(Value::Object(mut map)) => match map.remove("documents") {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(MongoHttpError::Protocol(
                            "expected array of documents in 'data'".to_owned(),
                        ))
                    }
                },
                None | Some(Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(MongoHttpError::Protocol(format!(
                        "expected array of documents in 'data', got {other}"
                    )))
                }
            },
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(document) => Ok(document),
                other => Err(MongoHttpError::Protocol(format!(
                    "expected document at index {index}, got {other}"
                ))),
            })
            .collect()
    }

    pub fn inserted_id(&self) -> Result<String> {
        id_string(self.required("insertedId")?, "insertedId")
    }

    pub fn inserted_ids(&self) -> Result<Vec<String>> {
        match self.required("insertedIds")? {
            Value::Array(ids) => ids
                .iter()
                .map(|id| id_string(id, "insertedIds"))
                .collect(),
            // Some drivers report `{ "0": id, "1": id }` keyed by input index.
            Value::Object(map) => {
                let mut ids = map
                    .iter()
                    .map(|(index, id)| {
                        let index = index.parse::<usize>().map_err(|_| {
                            MongoHttpError::Protocol(format!(
                                "invalid insertedIds index '{index}'"
                            ))
                        })?;
                        Ok((index, id_string(id, "insertedIds")?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                ids.sort_by_key(|(index, _)| *index);
                Ok(ids.into_iter().map(|(_, id)| id).collect())
            }
            other => Err(MongoHttpError::Protocol(format!(
                "field 'insertedIds' must be an array, got {other}"
            ))),
        }
    }

    pub fn update_counts(&self) -> Result<UpdateResult> {
        Ok(UpdateResult {
            matched_count: self.required_u64("matchedCount")?,
            modified_count: self.required_u64("modifiedCount")?,
        })
    }

    pub fn deleted_count(&self) -> Result<u64> {
        self.required_u64("deletedCount")
    }

    /// Accepts `{"count": n}` or a bare number in `data`.
    pub fn count(&self) -> Result<u64> {
        if let Some(n) = self
            .envelope("count")?
            .data
            .as_ref()
            .and_then(Value::as_u64)
        {
            return Ok(n);
        }
        self.required_u64("count")
    }

    pub fn connection_id(&self) -> Result<String> {
        id_string(self.required("connectionId")?, "connectionId")
    }

    /// Index name from `{"name": ...}`, `{"indexName": ...}` or a bare string.
    pub fn index_name(&self) -> Result<String> {
        let envelope = self.envelope("index name")?;
        if let Some(Value::String(name)) = envelope.data.as_ref() {
            return Ok(name.clone());
        }
        envelope
            .field("indexName")
            .or_else(|| envelope.field("name"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| MongoHttpError::Protocol("missing field 'name'".to_owned()))
    }
}

/// Ids may be strings, numbers or `{"$oid": "..."}` with any string payload.
fn id_string(value: &Value, field: &str) -> Result<String> {
    match value {
        Value::String(id) => Ok(id.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Object(map) => match map.get("$oid") {
            Some(Value::String(id)) => Ok(id.clone()),
            _ => Err(invalid_id(field, value)),
        },
        other => Err(invalid_id(field, other)),
    }
}

fn invalid_id(field: &str, value: &Value) -> MongoHttpError {
    MongoHttpError::Protocol(format!(
        "field '{field}' must be a string or ObjectId, got {value}"
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{decode, encode, escape_string, Decoded};
    use crate::{document, Document, FindOptions, MongoHttpError, Operation};

    #[test]
    fn escape_handles_quotes_backslashes_and_controls() {
        assert_eq!(escape_string(r#"a"b"#), r#""a\"b""#);
        assert_eq!(escape_string("a\\b"), r#""a\\b""#);
        assert_eq!(escape_string("l1\nl2"), r#""l1\nl2""#);
        assert_eq!(escape_string("\u{01}"), r#""\u0001""#);
    }

    #[test]
    fn escaped_values_round_trip() {
        let nasty = "he said \"hi\"\\\n\r\t\u{0}\u{1b} }, \"x\": 1";
        let body = encode(&Operation::InsertOne {
            document: document([("note", Value::from(nasty))]),
        })
        .expect("encode")
        .expect("body");

        let parsed: Value = serde_json::from_str(&body).expect("body must be valid JSON");
        assert_eq!(parsed["document"]["note"], nasty);
        assert_eq!(parsed.as_object().map(|o| o.len()), Some(1));

        let response = format!(r#"{{"success":true,"data":{{"note":{}}}}}"#, escape_string(nasty));
        let doc = decode(&response)
            .expect("decode")
            .document()
            .expect("document")
            .expect("some document");
        assert_eq!(doc["note"], nasty);
    }

    #[test]
    fn bodiless_verbs_encode_to_none() {
        assert_eq!(encode(&Operation::ListIndexes).expect("encode"), None);
        assert_eq!(encode(&Operation::Ping).expect("encode"), None);
    }

    #[test]
    fn find_body_omits_empty_options() {
        let body = encode(&Operation::Find {
            filter: Document::new(),
            options: FindOptions::default(),
        })
        .expect("encode")
        .expect("body");
        assert_eq!(body, r#"{"filter":{}}"#);

        let body = encode(&Operation::Find {
            filter: Document::new(),
            options: FindOptions::default().limit(5),
        })
        .expect("encode")
        .expect("body");
        assert_eq!(body, r#"{"filter":{},"options":{"limit":5}}"#);
    }

    #[test]
    fn find_one_scenario() {
        let body = encode(&Operation::FindOne {
            filter: document([("name", Value::from("a\"b"))]),
        })
        .expect("encode")
        .expect("body");
        assert_eq!(body, r#"{"filter":{"name":"a\"b"}}"#);

        let doc = decode(r#"{"success":true,"data":{"name":"a\"b","_id":"x1"}}"#)
            .expect("decode")
            .document()
            .expect("document")
            .expect("some document");
        assert_eq!(doc["name"], "a\"b");
        assert_eq!(doc["_id"], "x1");
    }

    #[test]
    fn null_data_is_no_result() {
        let decoded = decode(r#"{"success":true,"data":null}"#).expect("must decode");
        assert_eq!(decoded, Decoded::NoResult);
        assert_eq!(decoded.document().expect("document"), None);
    }

    #[test]
    fn success_false_is_api_error() {
        let err = decode(r#"{"success":false,"error":"duplicate key"}"#).expect_err("must fail");
        match err {
            MongoHttpError::Api { message } => assert_eq!(message, "duplicate key"),
            other => panic!("expected api error, got {other:?}"),
        }

        let err = decode(r#"{"success":false}"#).expect_err("must fail");
        assert!(matches!(err, MongoHttpError::Api { message } if message == "operation failed"));
    }

    #[test]
    fn malformed_bodies_are_protocol_errors() {
        for body in ["", "not json", r#"{"data":{}}"#, r#"{"success":"yes"}"#, "[1,2]"] {
            let err = decode(body).expect_err("must fail");
            assert!(matches!(err, MongoHttpError::Protocol(_)), "body {body:?}");
        }
    }

    #[test]
    fn compound_fields_from_data_or_top_level() {
        let nested = decode(r#"{"success":true,"data":{"matchedCount":2,"modifiedCount":1}}"#)
            .expect("decode");
        let counts = nested.update_counts().expect("counts");
        assert_eq!((counts.matched_count, counts.modified_count), (2, 1));

        let flat = decode(r#"{"success":true,"data":null,"deletedCount":3}"#).expect("decode");
        assert_eq!(flat.deleted_count().expect("deleted"), 3);
    }

    #[test]
    fn missing_required_field_is_protocol_error() {
        let decoded = decode(r#"{"success":true,"data":{"other":1}}"#).expect("decode");
        assert!(matches!(
            decoded.inserted_id(),
            Err(MongoHttpError::Protocol(_))
        ));
        let empty = decode(r#"{"success":true}"#).expect("decode");
        assert!(matches!(empty.count(), Err(MongoHttpError::Protocol(_))));
    }

    #[test]
    fn inserted_ids_accept_object_ids_and_index_maps() {
        let decoded = decode(
            r#"{"success":true,"data":{"insertedIds":[{"$oid":"507f1f77bcf86cd799439011"},"b"]}}"#,
        )
        .expect("decode");
        assert_eq!(
            decoded.inserted_ids().expect("ids"),
            vec!["507f1f77bcf86cd799439011".to_owned(), "b".to_owned()]
        );

        let decoded =
            decode(r#"{"success":true,"data":{"insertedIds":{"1":"second","0":"first"}}}"#)
                .expect("decode");
        assert_eq!(
            decoded.inserted_ids().expect("ids"),
            vec!["first".to_owned(), "second".to_owned()]
        );
    }

    #[test]
    fn inserted_id_accepts_non_hex_oid() {
        let decoded = decode(r#"{"success":true,"data":{"insertedId":{"$oid":"custom-7"}}}"#)
            .expect("decode");
        assert_eq!(decoded.inserted_id().expect("id"), "custom-7");

        let decoded = decode(r#"{"success":true,"data":{"insertedId":{"$oid":7}}}"#)
            .expect("decode");
        assert!(matches!(
            decoded.inserted_id(),
            Err(MongoHttpError::Protocol(_))
        ));
    }

    #[test]
    fn documents_accept_array_or_wrapped() {
        let decoded = decode(r#"{"success":true,"data":[{"a":1},{"a":2}]}"#).expect("decode");
        assert_eq!(decoded.documents().expect("docs").len(), 2);

        let decoded =
            decode(r#"{"success":true,"data":{"documents":[{"a":1}]}}"#).expect("decode");
        assert_eq!(decoded.documents().expect("docs").len(), 1);

        let decoded = decode(r#"{"success":true,"data":[1]}"#).expect("decode");
        assert!(matches!(
            decoded.documents(),
            Err(MongoHttpError::Protocol(_))
        ));
    }

    #[test]
    fn count_accepts_bare_number() {
        let decoded = decode(r#"{"success":true,"data":7}"#).expect("decode");
        assert_eq!(decoded.count().expect("count"), 7);
        let decoded = decode(r#"{"success":true,"data":{"count":9}}"#).expect("decode");
        assert_eq!(decoded.count().expect("count"), 9);
    }

    #[test]
    fn index_name_forms() {
        let decoded = decode(r#"{"success":true,"data":"score_-1"}"#).expect("decode");
        assert_eq!(decoded.index_name().expect("name"), "score_-1");
        let decoded = decode(r#"{"success":true,"data":{"indexName":"a_1"}}"#).expect("decode");
        assert_eq!(decoded.index_name().expect("name"), "a_1");
    }

    #[test]
    fn connection_id_is_extracted() {
        let decoded =
            decode(r#"{"success":true,"data":{"connectionId":"conn-9"}}"#).expect("decode");
        assert_eq!(decoded.connection_id().expect("id"), "conn-9");
    }
}
