//! Message durability
//!
//! Every connection gets a [`Store`] from the configured
//! [`StorageBackend`] at accept time. The engine persists each inbound
//! publish before fan-out and each outbound job before encoding; both
//! are best-effort and a failure never aborts the session. The store is
//! closed exactly once when the inbound loop exits.

mod error;
mod fjall;

pub use error::PersistenceError;
pub use fjall::FjallBackend;

use std::sync::Arc;

use crate::protocol::Packet;

/// Per-connection durability hook
pub trait Store: Send + Sync {
    /// Record an inbound message; called before fan-out
    fn persist_inbound(&self, packet: &Packet) -> Result<(), PersistenceError>;

    /// Record an outbound message; called before encoding
    fn persist_outbound(&self, packet: &Packet) -> Result<(), PersistenceError>;

    /// Release the store; called exactly once when the inbound loop exits
    fn close(&self);
}

/// Hands out per-connection stores
pub trait StorageBackend: Send + Sync {
    fn open(&self, session: &str) -> Arc<dyn Store>;
}

/// Store that remembers nothing
pub struct NullStore;

impl Store for NullStore {
    fn persist_inbound(&self, _packet: &Packet) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn persist_outbound(&self, _packet: &Packet) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn close(&self) {}
}

/// Backend used when persistence is disabled
pub struct NullBackend;

impl StorageBackend for NullBackend {
    fn open(&self, _session: &str) -> Arc<dyn Store> {
        Arc::new(NullStore)
    }
}
