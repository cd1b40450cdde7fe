use serde::Serialize;

use crate::Document;

/// Options for [`MongoHttpClient::find`](crate::MongoHttpClient::find).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FindOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.skip.is_none()
            && self.sort.is_none()
            && self.projection.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertOneResult {
    pub inserted_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{document, FindOptions};

    #[test]
    fn find_options_serialize_only_set_fields() {
        let options = FindOptions::default()
            .limit(10)
            .sort(document([("score", json!(-1))]));
        assert_eq!(
            serde_json::to_value(&options).expect("serialize"),
            json!({"limit": 10, "sort": {"score": -1}})
        );
        assert!(!options.is_empty());
        assert!(FindOptions::default().is_empty());
    }
}
