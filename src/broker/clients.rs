//! Client identity table
//!
//! Maps client ids to their live connections and is the sole arbiter of
//! duplicate ids. The takeover protocol itself lives in the connection
//! engine; this table only answers "who holds this id".

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::Connection;

pub struct ClientTable {
    clients: DashMap<String, Arc<Connection>>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register `conn` under `id`. Returns `None` on a fresh insert, or
    /// the currently registered connection when the id is already bound
    /// (in which case nothing is inserted).
    pub fn add_or_get_existing(
        &self,
        id: &str,
        conn: &Arc<Connection>,
    ) -> Option<Arc<Connection>> {
        match self.clients.entry(id.to_string()) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(conn.clone());
                None
            }
        }
    }

    /// Bind `id` to `conn`, replacing whatever held it. Takeover path
    /// only; the fresh path goes through [`Self::add_or_get_existing`].
    pub fn insert(&self, id: &str, conn: &Arc<Connection>) {
        self.clients.insert(id.to_string(), conn.clone());
    }

    /// Remove the entry for `id`, but only while it still names `conn`.
    /// A taken-over session's deferred removal must not evict its
    /// successor.
    pub fn remove(&self, id: &str, conn: &Arc<Connection>) {
        self.clients.remove_if(id, |_, held| Arc::ptr_eq(held, conn));
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.clients.get(id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}
