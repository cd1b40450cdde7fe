use std::{fmt, future::Future, path::Path, sync::Arc, time::Duration};

use reqwest::Method;
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};

use crate::{
    codec::{self, Decoded},
    operation::{Operation, Target},
    transport::{HttpRequest, ReqwestTransport, Transport},
    ClientConfig, CollectionHandle, ConnectionHandle, DeleteResult, Document, FindOptions,
    InsertManyResult, InsertOneResult, LastError, MongoHttpError, Registry, Result, RetryPolicy,
    Stats, StatsTracker, TransportError, UpdateResult,
};

/// HTTP client for a MongoDB REST API service.
///
/// Clones share the transport, statistics and handle registry; configuration
/// changes made through the setters apply to the instance they are called on.
#[derive(Clone)]
pub struct MongoHttpClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    retry: RetryPolicy,
    stats: Arc<StatsTracker>,
    registry: Arc<Registry>,
}

impl fmt::Debug for MongoHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoHttpClient")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl MongoHttpClient {
    /// Creates a client backed by [`ReqwestTransport`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            retry: RetryPolicy::from_config(&config),
            config,
            stats: Arc::new(StatsTracker::new()),
            registry: Arc::new(Registry::new()),
        })
    }

    /// Creates a client from `MONGODB_HTTP_*` environment variables.
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Creates a client from a TOML config file, with environment overrides.
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(ClientConfig::load_with_env(path)?)
    }

    /// Uses `registry` for handle bookkeeping instead of a private one.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sub-millisecond values round up to 1 ms; zero is rejected.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(MongoHttpError::Validation(
                "timeout must be positive".to_owned(),
            ));
        }
        let config = self.config.clone().with_timeout(timeout);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_max_retries(&mut self, max_retries: usize) {
        self.config.max_retries = max_retries;
        self.retry = RetryPolicy::from_config(&self.config);
    }

    pub fn set_retry_backoff(&mut self, backoff: Duration) {
        self.config = std::mem::take(&mut self.config).with_retry_backoff(backoff);
        self.retry = RetryPolicy::from_config(&self.config);
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.config.user_agent = user_agent.into();
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.config.api_key = Some(api_key.into());
    }

    /// Adds or replaces a fixed header sent with every request.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .config
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.config.headers.push((name, value)),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    /// Percentage of successful operations; `100.0` before any operation ran.
    pub fn success_rate(&self) -> f64 {
        self.stats.snapshot().success_rate()
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.stats.last_error()
    }

    pub fn clear_last_error(&self) {
        self.stats.clear_last_error();
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Opens a connection on the API service and registers a handle for it.
    pub async fn connect(&self, uri: &str) -> Result<ConnectionHandle> {
        self.observe("createConnection", async {
            let operation = Operation::CreateConnection {
                uri: uri.to_owned(),
            };
            let decoded = self.run(&Target::Service, &operation).await?;
            let handle = self.registry.insert_connection(decoded.connection_id()?, uri)?;
            self.stats.record_connection_opened();
            Ok(handle)
        })
        .await
    }

    /// Closes the remote connection and releases its handle and collections.
    pub async fn close_connection(&self, handle: ConnectionHandle) -> Result<()> {
        self.observe("closeConnection", async {
            let target = self.connection_target(handle)?;
            self.run(&target, &Operation::CloseConnection).await?;
            if self.registry.remove_connection(handle).is_some() {
                self.stats.record_connection_closed();
            }
            Ok(())
        })
        .await
    }

    /// Whether `handle` refers to an open connection. No request is sent.
    pub fn is_connection_active(&self, handle: ConnectionHandle) -> bool {
        self.registry
            .connection(handle)
            .is_some_and(|info| info.active)
    }

    /// Asks the API service whether the connection is still usable.
    pub async fn ping(&self, handle: ConnectionHandle) -> Result<()> {
        self.observe("ping", async {
            let target = self.connection_target(handle)?;
            self.run(&target, &Operation::Ping).await?;
            self.registry.touch_connection(handle);
            Ok(())
        })
        .await
    }

    /// Closes every registered connection, returning the first failure.
    pub async fn close_all(&self) -> Result<()> {
        let mut first_error = None;
        for handle in self.registry.connection_handles() {
            if let Err(err) = self.close_connection(handle).await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Registers a collection handle. No request is sent.
    ///
    /// An empty `database` selects [`ClientConfig::default_database`].
    pub fn collection(
        &self,
        connection: ConnectionHandle,
        database: &str,
        collection: &str,
    ) -> Result<CollectionHandle> {
        let database = if database.trim().is_empty() {
            self.config.default_database.as_str()
        } else {
            database
        };

        let result = if database.trim().is_empty() || collection.trim().is_empty() {
            Err(MongoHttpError::Validation(
                "database and collection names cannot be empty".to_owned(),
            ))
        } else {
            self.registry
                .insert_collection(connection, database, collection)
        };

        if let Err(err) = &result {
            self.stats.set_last_error(err);
        }
        result
    }

    /// Forgets a collection handle. Returns whether it was registered.
    pub fn release_collection(&self, handle: CollectionHandle) -> bool {
        self.registry.remove_collection(handle).is_some()
    }

    pub async fn insert_one(
        &self,
        collection: CollectionHandle,
        document: Document,
    ) -> Result<InsertOneResult> {
        self.observe("insertOne", async {
            let decoded = self
                .run_on(collection, &Operation::InsertOne { document })
                .await?;
            Ok(InsertOneResult {
                inserted_id: decoded.inserted_id()?,
            })
        })
        .await
    }

    pub async fn insert_many(
        &self,
        collection: CollectionHandle,
        documents: Vec<Document>,
    ) -> Result<InsertManyResult> {
        self.observe("insertMany", async {
            let expected = documents.len();
            let decoded = self
                .run_on(collection, &Operation::InsertMany { documents })
                .await?;
            let inserted_ids = decoded.inserted_ids()?;
            if inserted_ids.len() != expected {
                return Err(MongoHttpError::Protocol(format!(
                    "insertedIds count mismatch: expected {expected}, got {}",
                    inserted_ids.len()
                )));
            }
            Ok(InsertManyResult { inserted_ids })
        })
        .await
    }

    /// Returns the first matching document, or `None` when nothing matched.
    pub async fn find_one(
        &self,
        collection: CollectionHandle,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.observe("findOne", async {
            self.run_on(collection, &Operation::FindOne { filter })
                .await?
                .document()
        })
        .await
    }

    pub async fn find(
        &self,
        collection: CollectionHandle,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        self.observe("find", async {
            self.run_on(collection, &Operation::Find { filter, options })
                .await?
                .documents()
        })
        .await
    }

    pub async fn update_one(
        &self,
        collection: CollectionHandle,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult> {
        self.observe("updateOne", async {
            self.run_on(collection, &Operation::UpdateOne { filter, update })
                .await?
                .update_counts()
        })
        .await
    }

    pub async fn update_many(
        &self,
        collection: CollectionHandle,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult> {
        self.observe("updateMany", async {
            self.run_on(collection, &Operation::UpdateMany { filter, update })
                .await?
                .update_counts()
        })
        .await
    }

    pub async fn delete_one(
        &self,
        collection: CollectionHandle,
        filter: Document,
    ) -> Result<DeleteResult> {
        self.observe("deleteOne", async {
            let deleted_count = self
                .run_on(collection, &Operation::DeleteOne { filter })
                .await?
                .deleted_count()?;
            Ok(DeleteResult { deleted_count })
        })
        .await
    }

    pub async fn delete_many(
        &self,
        collection: CollectionHandle,
        filter: Document,
    ) -> Result<DeleteResult> {
        self.observe("deleteMany", async {
            let deleted_count = self
                .run_on(collection, &Operation::DeleteMany { filter })
                .await?
                .deleted_count()?;
            Ok(DeleteResult { deleted_count })
        })
        .await
    }

    pub async fn count_documents(
        &self,
        collection: CollectionHandle,
        filter: Document,
    ) -> Result<u64> {
        self.observe("count", async {
            self.run_on(collection, &Operation::Count { filter })
                .await?
                .count()
        })
        .await
    }

    /// Creates an index and returns its name.
    pub async fn create_index(
        &self,
        collection: CollectionHandle,
        keys: Document,
        options: Document,
    ) -> Result<String> {
        self.observe("createIndex", async {
            self.run_on(collection, &Operation::CreateIndex { keys, options })
                .await?
                .index_name()
        })
        .await
    }

    pub async fn drop_index(&self, collection: CollectionHandle, name: &str) -> Result<()> {
        self.observe("dropIndex", async {
            let operation = Operation::DropIndex {
                name: name.to_owned(),
            };
            self.run_on(collection, &operation).await?;
            Ok(())
        })
        .await
    }

    pub async fn list_indexes(&self, collection: CollectionHandle) -> Result<Vec<Document>> {
        self.observe("listIndexes", async {
            self.run_on(collection, &Operation::ListIndexes)
                .await?
                .documents()
        })
        .await
    }

    /// Runs `operation` on the current tokio runtime without waiting for it.
    ///
    /// `on_complete` is called exactly once with the operation's result. If
    /// no runtime is available it is called immediately with an error and
    /// `None` is returned. Dispatched work cannot be cancelled.
    pub fn dispatch<T, Op, Fut, Done>(
        &self,
        operation: Op,
        on_complete: Done,
    ) -> Option<JoinHandle<()>>
    where
        T: Send + 'static,
        Op: FnOnce(MongoHttpClient) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        Done: FnOnce(Result<T>) + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => Some(self.dispatch_on(&runtime, operation, on_complete)),
            Err(err) => {
                let err = MongoHttpError::Config(format!("no async runtime to dispatch on: {err}"));
                self.stats.set_last_error(&err);
                on_complete(Err(err));
                None
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch), on an explicit runtime.
    ///
    /// If the runtime shuts down before the operation finishes, `on_complete`
    /// receives a transport error instead of being dropped uncalled.
    pub fn dispatch_on<T, Op, Fut, Done>(
        &self,
        runtime: &Handle,
        operation: Op,
        on_complete: Done,
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
        Op: FnOnce(MongoHttpClient) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        Done: FnOnce(Result<T>) + Send + 'static,
    {
        let client = self.clone();
        let completion = Completion::new(on_complete);
        runtime.spawn(async move {
            let result = operation(client).await;
            completion.complete(result);
        })
    }

    /// Fire-and-forget [`insert_one`](Self::insert_one).
    pub fn insert_one_detached<Done>(
        &self,
        collection: CollectionHandle,
        document: Document,
        on_complete: Done,
    ) -> Option<JoinHandle<()>>
    where
        Done: FnOnce(Result<InsertOneResult>) + Send + 'static,
    {
        self.dispatch(
            move |client| async move { client.insert_one(collection, document).await },
            on_complete,
        )
    }

    /// Fire-and-forget [`find_one`](Self::find_one).
    pub fn find_one_detached<Done>(
        &self,
        collection: CollectionHandle,
        filter: Document,
        on_complete: Done,
    ) -> Option<JoinHandle<()>>
    where
        Done: FnOnce(Result<Option<Document>>) + Send + 'static,
    {
        self.dispatch(
            move |client| async move { client.find_one(collection, filter).await },
            on_complete,
        )
    }

    async fn observe<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = work.await;
        let latency = started.elapsed();

        match &result {
            Ok(_) => self.stats.record_success(latency),
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    operation,
                    code = %err.code(),
                    latency_ms = latency.as_millis() as u64,
                    error = %err,
                    "operation failed"
                );
                self.stats.record_failure(err, latency);
            }
        }

        #[cfg(not(feature = "tracing"))]
        let _ = operation;

        result
    }

    async fn run_on(&self, collection: CollectionHandle, operation: &Operation) -> Result<Decoded> {
        let info = self
            .registry
            .collection(collection)
            .ok_or_else(|| {
                MongoHttpError::Validation(format!("unknown collection handle {collection}"))
            })?;
        let target = Target::Collection {
            connection_id: info.connection_id,
            database: info.database,
            collection: info.collection,
        };
        let decoded = self.run(&target, operation).await?;
        self.registry.touch_connection(info.connection);
        Ok(decoded)
    }

    async fn run(&self, target: &Target, operation: &Operation) -> Result<Decoded> {
        operation.validate()?;
        let path = operation.path(target)?;
        let body = codec::encode(operation)?;
        let request = self.build_request(operation.method(), &path, body);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            operation = operation.name(),
            method = %request.method,
            path = %path,
            body_len = request.body.as_ref().map_or(0, String::len),
            "sending request"
        );

        // Connection URIs may embed credentials.
        #[cfg(feature = "tracing")]
        if self.config.debug && !matches!(operation, Operation::CreateConnection { .. }) {
            tracing::debug!(body = request.body.as_deref().unwrap_or(""), "request body");
        }

        let response = self
            .retry
            .execute(self.transport.as_ref(), &request, &self.stats)
            .await?;

        #[cfg(feature = "tracing")]
        if self.config.debug {
            tracing::debug!(status = response.status, body = %response.body, "response body");
        }

        codec::decode(&response.body)
    }

    fn connection_target(&self, handle: ConnectionHandle) -> Result<Target> {
        let info = self
            .registry
            .connection(handle)
            .ok_or_else(|| unknown_connection(handle))?;
        Ok(Target::Connection {
            connection_id: info.connection_id,
        })
    }

    fn build_request(&self, method: Method, path: &str, body: Option<String>) -> HttpRequest {
        let mut headers = vec![
            ("Content-Type".to_owned(), "application/json".to_owned()),
            ("Accept".to_owned(), "application/json".to_owned()),
            ("User-Agent".to_owned(), self.config.user_agent.clone()),
        ];
        if let Some(api_key) = &self.config.api_key {
            headers.push(("X-API-Key".to_owned(), api_key.clone()));
        }
        headers.extend(self.config.headers.iter().cloned());

        HttpRequest {
            method,
            url: format!("{}{path}", self.config.base_url.trim_end_matches('/')),
            headers,
            body,
            timeout: self.config.timeout(),
        }
    }
}

fn unknown_connection(handle: ConnectionHandle) -> MongoHttpError {
    MongoHttpError::Validation(format!("unknown connection handle {handle}"))
}

/// Completion callback that fires exactly once, even if the task is dropped.
struct Completion<T, F: FnOnce(Result<T>)> {
    callback: Option<F>,
    _result: std::marker::PhantomData<fn(Result<T>)>,
}

impl<T, F: FnOnce(Result<T>)> Completion<T, F> {
    fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
            _result: std::marker::PhantomData,
        }
    }

    fn complete(mut self, result: Result<T>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<T, F: FnOnce(Result<T>)> Drop for Completion<T, F> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(MongoHttpError::Transport(TransportError::new(
                "operation was abandoned before completion",
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::{Completion, MongoHttpClient};
    use crate::{ClientConfig, MongoHttpError, Result};

    #[test]
    fn debug_redacts_api_key() {
        let config = ClientConfig::default().with_api_key("secret-key");
        let client = MongoHttpClient::new(config).expect("client");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = MongoHttpClient::new(ClientConfig::new("localhost:3300/api"))
            .expect_err("must fail");
        assert!(matches!(err, MongoHttpError::Config(_)));
    }

    #[test]
    fn setters_update_request_shape() {
        let mut client = MongoHttpClient::new(ClientConfig::default()).expect("client");
        client.set_user_agent("plugin/2.0");
        client.set_api_key("k");
        client.add_header("X-Server", "a");
        client.add_header("x-server", "b");
        client.set_max_retries(7);
        assert!(client.set_timeout(std::time::Duration::ZERO).is_err());

        let request =
            client.build_request(reqwest::Method::GET, "/api/v1/connections/c/ping", None);
        assert_eq!(request.url, "http://127.0.0.1:3300/api/v1/connections/c/ping");
        assert_eq!(request.header("user-agent"), Some("plugin/2.0"));
        assert_eq!(request.header("x-api-key"), Some("k"));
        assert_eq!(request.header("X-Server"), Some("b"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(client.retry.max_retries, 7);
    }

    #[test]
    fn dropped_completion_reports_abandonment_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let completion = Completion::new(move |result: Result<()>| {
            assert!(matches!(result, Err(MongoHttpError::Transport(_))));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        drop(completion);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn completed_completion_does_not_fire_again_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let completion = Completion::new(move |result: Result<u8>| {
            assert_eq!(result.expect("ok"), 3);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        completion.complete(Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_without_runtime_completes_immediately() {
        let client = MongoHttpClient::new(ClientConfig::default()).expect("client");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handle = client.dispatch(
            |client| async move {
                let handle = crate::CollectionHandle::from_raw(1).expect("non-zero");
                client.count_documents(handle, Default::default()).await
            },
            move |result| {
                assert!(matches!(result, Err(MongoHttpError::Config(_))));
                seen.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(handle.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.last_error().is_some());
    }
}
