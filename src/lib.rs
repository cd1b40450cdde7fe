//! `mongodb-http` is a resilient client for a MongoDB REST API service.
//!
//! The service exposes MongoDB over JSON/HTTP under `/api/v1`; this crate
//! wraps it with:
//! - connection and collection handles tracked in a [`Registry`]
//! - document CRUD and index management on [`MongoHttpClient`]
//! - bounded retries with exponential backoff ([`RetryPolicy`])
//! - per-client operation statistics and the last error ([`Stats`], [`LastError`])
//! - detached operations that report through a callback ([`MongoHttpClient::dispatch`])
//! - a synchronous facade for hosts without an async runtime (`BlockingClient`,
//!   behind the `blocking` feature)

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod codec;
mod client;
mod config;
mod error;
mod operation;
mod registry;
mod retry;
mod stats;
pub mod transport;
mod types;
pub mod value;
mod wire;

#[cfg(feature = "blocking")]
pub use blocking::BlockingClient;
pub use client::MongoHttpClient;
pub use codec::Decoded;
pub use config::ClientConfig;
pub use error::{ErrorCode, MongoHttpError, TransportError};
pub use operation::{Operation, Target};
pub use registry::{CollectionHandle, CollectionInfo, ConnectionHandle, ConnectionInfo, Registry};
pub use retry::{Disposition, RetryPolicy};
pub use stats::{LastError, Stats, StatsTracker};
pub use transport::{HttpRequest, RawResponse, ReqwestTransport, Transport};
pub use types::{DeleteResult, FindOptions, InsertManyResult, InsertOneResult, UpdateResult};
pub use value::{document, object_id, Document};
pub use wire::Envelope;

pub type Result<T> = std::result::Result<T, MongoHttpError>;
