//! Logical document-store operations and the endpoints they map to.

use reqwest::Method;
use urlencoding::encode as encode_segment;

use crate::{Document, FindOptions, MongoHttpError, Result};

pub(crate) const API_PREFIX: &str = "/api/v1";

/// One document-database verb together with its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    CreateConnection { uri: String },
    CloseConnection,
    Ping,
    InsertOne { document: Document },
    InsertMany { documents: Vec<Document> },
    FindOne { filter: Document },
    Find { filter: Document, options: FindOptions },
    UpdateOne { filter: Document, update: Document },
    UpdateMany { filter: Document, update: Document },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
    Count { filter: Document },
    CreateIndex { keys: Document, options: Document },
    DropIndex { name: String },
    ListIndexes,
}

/// Where an operation is addressed on the API service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Service,
    Connection {
        connection_id: String,
    },
    Collection {
        connection_id: String,
        database: String,
        collection: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Service,
    Connection,
    Collection,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateConnection { .. } => "createConnection",
            Self::CloseConnection => "closeConnection",
            Self::Ping => "ping",
            Self::InsertOne { .. } => "insertOne",
            Self::InsertMany { .. } => "insertMany",
            Self::FindOne { .. } => "findOne",
            Self::Find { .. } => "find",
            Self::UpdateOne { .. } => "updateOne",
            Self::UpdateMany { .. } => "updateMany",
            Self::DeleteOne { .. } => "deleteOne",
            Self::DeleteMany { .. } => "deleteMany",
            Self::Count { .. } => "count",
            Self::CreateIndex { .. } => "createIndex",
            Self::DropIndex { .. } => "dropIndex",
            Self::ListIndexes => "listIndexes",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Ping | Self::ListIndexes => Method::GET,
            Self::UpdateOne { .. } | Self::UpdateMany { .. } => Method::PUT,
            Self::CloseConnection
            | Self::DeleteOne { .. }
            | Self::DeleteMany { .. }
            | Self::DropIndex { .. } => Method::DELETE,
            Self::CreateConnection { .. }
            | Self::InsertOne { .. }
            | Self::InsertMany { .. }
            | Self::FindOne { .. }
            | Self::Find { .. }
            | Self::Count { .. }
            | Self::CreateIndex { .. } => Method::POST,
        }
    }

    fn scope(&self) -> Scope {
        match self {
            Self::CreateConnection { .. } => Scope::Service,
            Self::CloseConnection | Self::Ping => Scope::Connection,
            _ => Scope::Collection,
        }
    }

    /// Path suffix below the collection root, e.g. `documents/findOne`.
    fn collection_suffix(&self) -> String {
        match self {
            Self::InsertOne { .. } => "documents".to_owned(),
            Self::InsertMany { .. } => "documents/insertMany".to_owned(),
            Self::FindOne { .. } => "documents/findOne".to_owned(),
            Self::Find { .. } => "documents/find".to_owned(),
            Self::UpdateOne { .. } => "documents/updateOne".to_owned(),
            Self::UpdateMany { .. } => "documents/updateMany".to_owned(),
            Self::DeleteOne { .. } => "documents/deleteOne".to_owned(),
            Self::DeleteMany { .. } => "documents/deleteMany".to_owned(),
            Self::Count { .. } => "documents/count".to_owned(),
            Self::CreateIndex { .. } | Self::ListIndexes => "indexes".to_owned(),
            Self::DropIndex { name } => format!("indexes/{}", encode_segment(name)),
            Self::CreateConnection { .. } | Self::CloseConnection | Self::Ping => String::new(),
        }
    }

    /// Renders the request path for this operation against `target`.
    pub fn path(&self, target: &Target) -> Result<String> {
        match (self.scope(), target) {
            (Scope::Service, Target::Service) => Ok(format!("{API_PREFIX}/connections")),
            (Scope::Connection, Target::Connection { connection_id }) => {
                let base = format!("{API_PREFIX}/connections/{}", encode_segment(connection_id));
                Ok(match self {
                    Self::Ping => format!("{base}/ping"),
                    _ => base,
                })
            }
            (
                Scope::Collection,
                Target::Collection {
                    connection_id,
                    database,
                    collection,
                },
            ) => Ok(format!(
                "{API_PREFIX}/connections/{}/databases/{}/collections/{}/{}",
                encode_segment(connection_id),
                encode_segment(database),
                encode_segment(collection),
                self.collection_suffix()
            )),
            (scope, target) => Err(MongoHttpError::Validation(format!(
                "operation {} ({scope:?} scope) cannot be addressed to {target:?}",
                self.name()
            ))),
        }
    }

    /// Checks caller-supplied parameters before any request is built.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CreateConnection { uri } if uri.trim().is_empty() => {
                Err(invalid(self, "connection URI cannot be empty"))
            }
            Self::InsertMany { documents } if documents.is_empty() => {
                Err(invalid(self, "documents cannot be empty"))
            }
            Self::UpdateOne { update, .. } | Self::UpdateMany { update, .. }
                if update.is_empty() =>
            {
                Err(invalid(self, "update document cannot be empty"))
            }
            Self::CreateIndex { keys, .. } if keys.is_empty() => {
                Err(invalid(self, "index keys cannot be empty"))
            }
            Self::DropIndex { name } if name.trim().is_empty() => {
                Err(invalid(self, "index name cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

fn invalid(operation: &Operation, reason: &str) -> MongoHttpError {
    MongoHttpError::Validation(format!("{}: {reason}", operation.name()))
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::{Operation, Target};
    use crate::{document, Document, MongoHttpError};

    fn users() -> Target {
        Target::Collection {
            connection_id: "c1".to_owned(),
            database: "game".to_owned(),
            collection: "players".to_owned(),
        }
    }

    #[test]
    fn collection_paths() {
        let find_one = Operation::FindOne {
            filter: Document::new(),
        };
        assert_eq!(
            find_one.path(&users()).expect("path"),
            "/api/v1/connections/c1/databases/game/collections/players/documents/findOne"
        );
        assert_eq!(find_one.method(), Method::POST);

        let update = Operation::UpdateMany {
            filter: Document::new(),
            update: document([("$set", json!({"a": 1}))]),
        };
        assert!(update.path(&users()).expect("path").ends_with("documents/updateMany"));
        assert_eq!(update.method(), Method::PUT);
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        let target = Target::Collection {
            connection_id: "c1".to_owned(),
            database: "my db".to_owned(),
            collection: "a/b".to_owned(),
        };
        let path = Operation::DropIndex {
            name: "name_1".to_owned(),
        }
        .path(&target)
        .expect("path");
        assert_eq!(
            path,
            "/api/v1/connections/c1/databases/my%20db/collections/a%2Fb/indexes/name_1"
        );
    }

    #[test]
    fn connection_paths() {
        let target = Target::Connection {
            connection_id: "abc".to_owned(),
        };
        assert_eq!(
            Operation::Ping.path(&target).expect("path"),
            "/api/v1/connections/abc/ping"
        );
        assert_eq!(
            Operation::CloseConnection.path(&target).expect("path"),
            "/api/v1/connections/abc"
        );
        assert_eq!(Operation::CloseConnection.method(), Method::DELETE);
    }

    #[test]
    fn scope_mismatch_is_rejected() {
        let err = Operation::ListIndexes
            .path(&Target::Service)
            .expect_err("must fail");
        assert!(matches!(err, MongoHttpError::Validation(_)));
    }

    #[test]
    fn validate_rejects_empty_payloads() {
        assert!(Operation::InsertMany { documents: vec![] }.validate().is_err());
        assert!(Operation::UpdateOne {
            filter: Document::new(),
            update: Document::new()
        }
        .validate()
        .is_err());
        assert!(Operation::DeleteMany {
            filter: Document::new()
        }
        .validate()
        .is_ok());
    }
}
