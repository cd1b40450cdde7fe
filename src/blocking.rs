//! Synchronous facade over [`MongoHttpClient`] for hosts without an async runtime.
//!
//! Each [`BlockingClient`] owns a small tokio runtime. Blocking calls run on
//! the calling thread; detached calls run on the runtime's worker and report
//! through their callback. Do not create or drop a `BlockingClient` from
//! inside an async context.

use std::{fmt, path::Path, sync::Arc, time::Duration};

use tokio::{
    runtime::{Builder, Runtime},
    task::JoinHandle,
};

use crate::{
    ClientConfig, CollectionHandle, ConnectionHandle, DeleteResult, Document, FindOptions,
    InsertManyResult, InsertOneResult, LastError, MongoHttpClient, MongoHttpError, Registry,
    Result, Stats, Transport, UpdateResult,
};

pub struct BlockingClient {
    inner: MongoHttpClient,
    runtime: Arc<Runtime>,
}

impl fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingClient")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let runtime = build_runtime()?;
        let inner = MongoHttpClient::new(config)?;
        Ok(Self::from_parts(inner, runtime))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let runtime = build_runtime()?;
        let inner = MongoHttpClient::with_transport(config, transport)?;
        Ok(Self::from_parts(inner, runtime))
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(ClientConfig::load_with_env(path)?)
    }

    fn from_parts(inner: MongoHttpClient, runtime: Runtime) -> Self {
        Self {
            inner,
            runtime: Arc::new(runtime),
        }
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.inner = self.inner.with_registry(registry);
        self
    }

    /// The async client this facade drives.
    pub fn async_client(&self) -> &MongoHttpClient {
        &self.inner
    }

    pub fn config(&self) -> &ClientConfig {
        self.inner.config()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.inner.set_timeout(timeout)
    }

    pub fn set_max_retries(&mut self, max_retries: usize) {
        self.inner.set_max_retries(max_retries);
    }

    pub fn set_retry_backoff(&mut self, backoff: Duration) {
        self.inner.set_retry_backoff(backoff);
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.inner.set_user_agent(user_agent);
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.inner.set_api_key(api_key);
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.add_header(name, value);
    }

    pub fn stats(&self) -> Stats {
        self.inner.stats()
    }

    pub fn success_rate(&self) -> f64 {
        self.inner.success_rate()
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.inner.last_error()
    }

    pub fn clear_last_error(&self) {
        self.inner.clear_last_error();
    }

    pub fn reset_stats(&self) {
        self.inner.reset_stats();
    }

    pub fn connect(&self, uri: &str) -> Result<ConnectionHandle> {
        self.runtime.block_on(self.inner.connect(uri))
    }

    pub fn close_connection(&self, handle: ConnectionHandle) -> Result<()> {
        self.runtime.block_on(self.inner.close_connection(handle))
    }

    pub fn is_connection_active(&self, handle: ConnectionHandle) -> bool {
        self.inner.is_connection_active(handle)
    }

    pub fn ping(&self, handle: ConnectionHandle) -> Result<()> {
        self.runtime.block_on(self.inner.ping(handle))
    }

    pub fn close_all(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close_all())
    }

    pub fn collection(
        &self,
        connection: ConnectionHandle,
        database: &str,
        collection: &str,
    ) -> Result<CollectionHandle> {
        self.inner.collection(connection, database, collection)
    }

    pub fn release_collection(&self, handle: CollectionHandle) -> bool {
        self.inner.release_collection(handle)
    }

    pub fn insert_one(
        &self,
        collection: CollectionHandle,
        document: Document,
    ) -> Result<InsertOneResult> {
        self.runtime.block_on(self.inner.insert_one(collection, document))
    }

    pub fn insert_many(
        &self,
        collection: CollectionHandle,
        documents: Vec<Document>,
    ) -> Result<InsertManyResult> {
        self.runtime.block_on(self.inner.insert_many(collection, documents))
    }

    pub fn find_one(
        &self,
        collection: CollectionHandle,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.runtime.block_on(self.inner.find_one(collection, filter))
    }

    pub fn find(
        &self,
        collection: CollectionHandle,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        self.runtime.block_on(self.inner.find(collection, filter, options))
    }

    pub fn update_one(
        &self,
        collection: CollectionHandle,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult> {
        self.runtime.block_on(self.inner.update_one(collection, filter, update))
    }

    pub fn update_many(
        &self,
        collection: CollectionHandle,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult> {
        self.runtime.block_on(self.inner.update_many(collection, filter, update))
    }

    pub fn delete_one(
        &self,
        collection: CollectionHandle,
        filter: Document,
    ) -> Result<DeleteResult> {
        self.runtime.block_on(self.inner.delete_one(collection, filter))
    }

    pub fn delete_many(
        &self,
        collection: CollectionHandle,
        filter: Document,
    ) -> Result<DeleteResult> {
        self.runtime.block_on(self.inner.delete_many(collection, filter))
    }

    pub fn count_documents(&self, collection: CollectionHandle, filter: Document) -> Result<u64> {
        self.runtime.block_on(self.inner.count_documents(collection, filter))
    }

    pub fn create_index(
        &self,
        collection: CollectionHandle,
        keys: Document,
        options: Document,
    ) -> Result<String> {
        self.runtime.block_on(self.inner.create_index(collection, keys, options))
    }

    pub fn drop_index(&self, collection: CollectionHandle, name: &str) -> Result<()> {
        self.runtime.block_on(self.inner.drop_index(collection, name))
    }

    pub fn list_indexes(&self, collection: CollectionHandle) -> Result<Vec<Document>> {
        self.runtime.block_on(self.inner.list_indexes(collection))
    }

    /// Runs `operation` on the background worker; see [`MongoHttpClient::dispatch_on`].
    pub fn dispatch<T, Op, Fut, Done>(&self, operation: Op, on_complete: Done) -> JoinHandle<()>
    where
        T: Send + 'static,
        Op: FnOnce(MongoHttpClient) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
        Done: FnOnce(Result<T>) + Send + 'static,
    {
        self.inner.dispatch_on(self.runtime.handle(), operation, on_complete)
    }

    pub fn insert_one_detached<Done>(
        &self,
        collection: CollectionHandle,
        document: Document,
        on_complete: Done,
    ) -> JoinHandle<()>
    where
        Done: FnOnce(Result<InsertOneResult>) + Send + 'static,
    {
        self.dispatch(
            move |client| async move { client.insert_one(collection, document).await },
            on_complete,
        )
    }

    pub fn find_one_detached<Done>(
        &self,
        collection: CollectionHandle,
        filter: Document,
        on_complete: Done,
    ) -> JoinHandle<()>
    where
        Done: FnOnce(Result<Option<Document>>) + Send + 'static,
    {
        self.dispatch(
            move |client| async move { client.find_one(collection, filter).await },
            on_complete,
        )
    }
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("mongodb-http")
        .enable_all()
        .build()
        .map_err(|err| MongoHttpError::Config(format!("failed to start async runtime: {err}")))
}
