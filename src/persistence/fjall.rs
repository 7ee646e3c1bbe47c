//! Fjall-backed message log
//!
//! Appends every inbound and outbound publish to an LSM keyspace, one
//! partition per direction, keyed by session and sequence number. Only
//! PUBLISH frames carry payload worth keeping; everything else is a
//! no-op.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bincode::{Decode, Encode};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use tracing::warn;

use super::{PersistenceError, StorageBackend, Store};
use crate::protocol::{Packet, Publish};

/// Serialized form of a logged publish
#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct StoredMessage {
    topic: String,
    payload: Vec<u8>,
    qos: u8,
    message_id: u16,
    retain: bool,
}

impl From<&Publish> for StoredMessage {
    fn from(p: &Publish) -> Self {
        Self {
            topic: p.topic.to_string(),
            payload: p.payload.to_vec(),
            qos: p.qos as u8,
            message_id: p.message_id,
            retain: p.retain,
        }
    }
}

/// Message-log backend over a fjall keyspace
pub struct FjallBackend {
    keyspace: Keyspace,
    inbound: PartitionHandle,
    outbound: PartitionHandle,
}

impl FjallBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let keyspace = Config::new(path).open()?;
        let inbound = keyspace.open_partition("inbound", PartitionCreateOptions::default())?;
        let outbound = keyspace.open_partition("outbound", PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            inbound,
            outbound,
        })
    }
}

impl StorageBackend for FjallBackend {
    fn open(&self, session: &str) -> Arc<dyn Store> {
        Arc::new(FjallStore {
            session: session.to_string(),
            keyspace: self.keyspace.clone(),
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
            seq: AtomicU64::new(0),
        })
    }
}

/// Per-connection view onto the shared message log
pub struct FjallStore {
    session: String,
    keyspace: Keyspace,
    inbound: PartitionHandle,
    outbound: PartitionHandle,
    seq: AtomicU64,
}

impl FjallStore {
    fn append(&self, partition: &PartitionHandle, publish: &Publish) -> Result<(), PersistenceError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}/{:016x}", self.session, seq);
        let value = bincode::encode_to_vec(StoredMessage::from(publish), bincode::config::standard())?;
        partition.insert(key, value)?;
        Ok(())
    }
}

impl Store for FjallStore {
    fn persist_inbound(&self, packet: &Packet) -> Result<(), PersistenceError> {
        match packet {
            Packet::Publish(p) => self.append(&self.inbound, p),
            _ => Ok(()),
        }
    }

    fn persist_outbound(&self, packet: &Packet) -> Result<(), PersistenceError> {
        match packet {
            Packet::Publish(p) => self.append(&self.outbound, p),
            _ => Ok(()),
        }
    }

    fn close(&self) {
        if let Err(e) = self.keyspace.persist(PersistMode::SyncAll) {
            warn!("session {}: flush on close failed: {}", self.session, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::QoS;
    use bytes::Bytes;

    fn publish(topic: &str) -> Packet {
        Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: topic.into(),
            message_id: 3,
            payload: Bytes::from_static(b"payload"),
        })
    }

    #[test]
    fn publishes_land_in_the_right_partition() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FjallBackend::open(dir.path()).unwrap();
        let store = backend.open("127.0.0.1:5000");

        store.persist_inbound(&publish("a")).unwrap();
        store.persist_inbound(&publish("b")).unwrap();
        store.persist_outbound(&publish("c")).unwrap();
        // Non-publish frames are skipped
        store.persist_inbound(&Packet::PingReq).unwrap();
        store.close();

        assert_eq!(backend.inbound.iter().count(), 2);
        assert_eq!(backend.outbound.iter().count(), 1);
    }

    #[test]
    fn stored_messages_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FjallBackend::open(dir.path()).unwrap();
        let store = backend.open("peer");

        store.persist_inbound(&publish("room/1")).unwrap();

        let (_key, value) = backend.inbound.iter().next().unwrap().unwrap();
        let (message, _): (StoredMessage, usize) =
            bincode::decode_from_slice(&value, bincode::config::standard()).unwrap();
        assert_eq!(
            message,
            StoredMessage {
                topic: "room/1".to_string(),
                payload: b"payload".to_vec(),
                qos: 1,
                message_id: 3,
                retain: false,
            }
        );
    }

    #[test]
    fn sessions_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FjallBackend::open(dir.path()).unwrap();
        let a = backend.open("peer-a");
        let b = backend.open("peer-b");

        a.persist_inbound(&publish("t")).unwrap();
        b.persist_inbound(&publish("t")).unwrap();

        assert_eq!(backend.inbound.iter().count(), 2);
    }
}
