//! Owned table mapping opaque handles to connection and collection descriptors.
//!
//! A host hands integer handles to its scripts; the registry resolves them
//! back to the remote connection id and database/collection names. It is an
//! ordinary value owned by whoever creates it and injected into clients, so
//! several independent registries can coexist in one process.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use crate::{MongoHttpError, Result};

/// Handle to a connection registered with the API service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u32);

/// Handle to a database/collection pair on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionHandle(u32);

macro_rules! handle_repr {
    ($name:ident) => {
        impl $name {
            /// Raw value handed to the host. Never zero.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Rebuilds a handle from a host-supplied value; `0` is never valid.
            pub fn from_raw(raw: u32) -> Option<Self> {
                (raw != 0).then_some(Self(raw))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_repr!(ConnectionHandle);
handle_repr!(CollectionHandle);

#[derive(Clone)]
pub struct ConnectionInfo {
    /// Id assigned by the API service.
    pub connection_id: String,
    /// Connection string the service was asked to open. May hold credentials.
    pub uri: String,
    pub active: bool,
    pub created_at: Instant,
    pub last_used: Instant,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("connection_id", &self.connection_id)
            .field("uri", &"<redacted>")
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .field("last_used", &self.last_used)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionInfo {
    pub connection: ConnectionHandle,
    pub connection_id: String,
    pub database: String,
    pub collection: String,
}

#[derive(Default)]
struct Tables {
    next_id: u32,
    connections: HashMap<ConnectionHandle, ConnectionInfo>,
    collections: HashMap<CollectionHandle, CollectionInfo>,
}

impl Tables {
    /// Handles are never reused, so the space is exhausted at `u32::MAX`.
    fn allocate(&mut self) -> Result<u32> {
        let id = self.next_id.checked_add(1).ok_or_else(|| {
            MongoHttpError::Validation("handle space exhausted".to_owned())
        })?;
        self.next_id = id;
        Ok(id)
    }
}

#[derive(Default)]
pub struct Registry {
    tables: Mutex<Tables>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.lock();
        f.debug_struct("Registry")
            .field("connections", &tables.connections.len())
            .field("collections", &tables.collections.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_connection(
        &self,
        connection_id: impl Into<String>,
        uri: impl Into<String>,
    ) -> Result<ConnectionHandle> {
        let mut tables = self.lock();
        let handle = ConnectionHandle(tables.allocate()?);
        let now = Instant::now();
        tables.connections.insert(
            handle,
            ConnectionInfo {
                connection_id: connection_id.into(),
                uri: uri.into(),
                active: true,
                created_at: now,
                last_used: now,
            },
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(handle = handle.0, "registered connection");

        Ok(handle)
    }

    pub fn connection(&self, handle: ConnectionHandle) -> Option<ConnectionInfo> {
        self.lock().connections.get(&handle).cloned()
    }

    /// Marks the connection as used now.
    pub fn touch_connection(&self, handle: ConnectionHandle) {
        if let Some(info) = self.lock().connections.get_mut(&handle) {
            info.last_used = Instant::now();
        }
    }

    /// Removes the connection and every collection opened on it.
    pub fn remove_connection(&self, handle: ConnectionHandle) -> Option<ConnectionInfo> {
        let mut tables = self.lock();
        let removed = tables.connections.remove(&handle)?;
        tables
            .collections
            .retain(|_, collection| collection.connection != handle);

        #[cfg(feature = "tracing")]
        tracing::debug!(handle = handle.0, "released connection");

        Some(removed)
    }

    /// Registers a collection on an existing connection.
    pub fn insert_collection(
        &self,
        connection: ConnectionHandle,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<CollectionHandle> {
        let mut tables = self.lock();
        let connection_id = tables
            .connections
            .get(&connection)
            .ok_or_else(|| {
                MongoHttpError::Validation(format!("unknown connection handle {connection}"))
            })?
            .connection_id
            .clone();
        let handle = CollectionHandle(tables.allocate()?);
        tables.collections.insert(
            handle,
            CollectionInfo {
                connection,
                connection_id,
                database: database.into(),
                collection: collection.into(),
            },
        );
        Ok(handle)
    }

    pub fn collection(&self, handle: CollectionHandle) -> Option<CollectionInfo> {
        self.lock().collections.get(&handle).cloned()
    }

    pub fn remove_collection(&self, handle: CollectionHandle) -> Option<CollectionInfo> {
        self.lock().collections.remove(&handle)
    }

    /// Handles of every registered connection, in allocation order.
    pub fn connection_handles(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<_> = self.lock().connections.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn collection_count(&self) -> usize {
        self.lock().collections.len()
    }
}
