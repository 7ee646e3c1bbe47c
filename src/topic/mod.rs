//! Subscription registry and retained-message set
//!
//! Maps topic patterns to live connections and fans published messages
//! out to every matching subscriber's outbound queue. Internally
//! synchronized; fan-out collects its targets under the read lock and
//! delivers after releasing it, so a blocking enqueue never suspends
//! while the registry is locked.

pub mod matcher;

pub use matcher::{is_wild, matches};

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::debug;

use crate::broker::Connection;
use crate::protocol::{Packet, Publish};

/// Subscription registry shared by every connection of a server.
pub struct SubscriptionRegistry {
    /// pattern -> subscribers; one entry per distinct (pattern, conn)
    subscriptions: RwLock<AHashMap<String, Vec<Arc<Connection>>>>,
    /// At most one retained message per exact topic, in first-insertion
    /// order. An updated topic keeps its original slot.
    retained: Mutex<Vec<Publish>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(AHashMap::new()),
            retained: Mutex::new(Vec::new()),
        }
    }

    /// Insert a subscription. Duplicates of the same (pattern, conn)
    /// collapse to one entry.
    pub fn add(&self, pattern: &str, conn: &Arc<Connection>) {
        let mut subs = self.subscriptions.write();
        let entry = subs.entry(pattern.to_string()).or_default();
        if !entry.iter().any(|c| Arc::ptr_eq(c, conn)) {
            entry.push(conn.clone());
        }
    }

    /// Remove one subscription. Absent entries are a silent no-op.
    pub fn unsub(&self, pattern: &str, conn: &Arc<Connection>) {
        let mut subs = self.subscriptions.write();
        if let Some(entry) = subs.get_mut(pattern) {
            entry.retain(|c| !Arc::ptr_eq(c, conn));
            if entry.is_empty() {
                subs.remove(pattern);
            }
        }
    }

    /// Remove every subscription held by `conn`. Called once during
    /// connection teardown.
    pub fn unsub_all(&self, conn: &Arc<Connection>) {
        let mut subs = self.subscriptions.write();
        subs.retain(|_, entry| {
            entry.retain(|c| !Arc::ptr_eq(c, conn));
            !entry.is_empty()
        });
    }

    /// Total number of (pattern, conn) entries.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().values().map(Vec::len).sum()
    }

    /// True if `conn` holds any subscription.
    pub fn has_subscriber(&self, conn: &Arc<Connection>) -> bool {
        self.subscriptions
            .read()
            .values()
            .any(|entry| entry.iter().any(|c| Arc::ptr_eq(c, conn)))
    }

    /// Fan a publish out to every matching subscriber. A connection
    /// matched by several patterns receives a single copy. Delivery order
    /// to one subscriber is the order of `submit` calls.
    pub async fn submit(&self, publish: &Publish) {
        if publish.retain {
            self.store_retained(publish);
        }

        let targets: SmallVec<[Arc<Connection>; 16]> = {
            let subs = self.subscriptions.read();
            let mut seen: AHashSet<usize> = AHashSet::new();
            let mut targets = SmallVec::new();
            for (pattern, entry) in subs.iter() {
                if !matcher::matches(pattern, &publish.topic) {
                    continue;
                }
                for conn in entry {
                    if seen.insert(Arc::as_ptr(conn) as usize) {
                        targets.push(conn.clone());
                    }
                }
            }
            targets
        };

        for conn in targets {
            conn.submit(Packet::Publish(publish.clone())).await;
        }
    }

    /// Replay retained messages whose topic matches `pattern` to one
    /// connection, in topic insertion order.
    pub async fn send_retain(&self, pattern: &str, conn: &Arc<Connection>) {
        let replay: Vec<Publish> = {
            let retained = self.retained.lock();
            retained
                .iter()
                .filter(|p| matcher::matches(pattern, &p.topic))
                .cloned()
                .collect()
        };

        for publish in replay {
            conn.submit(Packet::Publish(publish)).await;
        }
    }

    /// Number of retained topics.
    pub fn retained_count(&self) -> usize {
        self.retained.lock().len()
    }

    /// Latest retained publish wins; an empty payload clears the slot.
    fn store_retained(&self, publish: &Publish) {
        let mut retained = self.retained.lock();
        if publish.payload.is_empty() {
            let before = retained.len();
            retained.retain(|p| p.topic != publish.topic);
            if retained.len() != before {
                debug!("retained message for {} cleared", publish.topic);
            }
            return;
        }

        if let Some(slot) = retained.iter_mut().find(|p| p.topic == publish.topic) {
            *slot = publish.clone();
        } else {
            retained.push(publish.clone());
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Connection, OverflowStrategy};
    use crate::protocol::QoS;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn test_conn(capacity: usize) -> (Arc<Connection>, mpsc::Receiver<crate::broker::Job>) {
        let (tx, rx) = mpsc::channel(capacity);
        let addr = "127.0.0.1:0".parse().unwrap();
        (
            Arc::new(Connection::new(addr, tx, OverflowStrategy::Block)),
            rx,
        )
    }

    fn publish(topic: &str, payload: &[u8]) -> Publish {
        Publish {
            topic: topic.into(),
            payload: Bytes::copy_from_slice(payload),
            ..Publish::default()
        }
    }

    fn retained(topic: &str, payload: &[u8]) -> Publish {
        Publish {
            retain: true,
            ..publish(topic, payload)
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_matching_subscribers_only() {
        let registry = SubscriptionRegistry::new();
        let (a, mut a_rx) = test_conn(8);
        let (b, mut b_rx) = test_conn(8);

        registry.add("room/+", &a);
        registry.add("hall/#", &b);

        registry.submit(&publish("room/1", b"hi")).await;

        let job = a_rx.try_recv().expect("a receives");
        match job.packet {
            Packet::Publish(p) => {
                assert_eq!(&*p.topic, "room/1");
                assert_eq!(&p.payload[..], b"hi");
            }
            other => panic!("expected PUBLISH, got {:?}", other),
        }
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overlapping_patterns_deliver_once() {
        let registry = SubscriptionRegistry::new();
        let (a, mut a_rx) = test_conn(8);

        registry.add("room/+", &a);
        registry.add("room/#", &a);
        registry.add("room/1", &a);

        registry.submit(&publish("room/1", b"x")).await;

        assert!(a_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err(), "duplicates must collapse");
    }

    #[tokio::test]
    async fn duplicate_add_collapses() {
        let registry = SubscriptionRegistry::new();
        let (a, _a_rx) = test_conn(8);

        registry.add("t", &a);
        registry.add("t", &a);
        assert_eq!(registry.subscription_count(), 1);
    }

    #[tokio::test]
    async fn unsub_and_unsub_all() {
        let registry = SubscriptionRegistry::new();
        let (a, mut a_rx) = test_conn(8);
        let (b, _b_rx) = test_conn(8);

        registry.add("x/#", &a);
        registry.add("y", &a);
        registry.add("x/#", &b);

        registry.unsub("x/#", &a);
        registry.submit(&publish("x/1", b"p")).await;
        assert!(a_rx.try_recv().is_err());

        registry.unsub_all(&b);
        assert!(!registry.has_subscriber(&b));
        assert_eq!(registry.subscription_count(), 1); // a's "y" remains

        // Removing what is already gone is a no-op
        registry.unsub("x/#", &a);
    }

    #[tokio::test]
    async fn retained_replay_in_insertion_order() {
        let registry = SubscriptionRegistry::new();
        let (a, mut a_rx) = test_conn(8);

        registry.submit(&retained("light/1", b"on")).await;
        registry.submit(&retained("light/2", b"off")).await;
        // Update keeps the original slot
        registry.submit(&retained("light/1", b"dim")).await;

        registry.send_retain("light/+", &a).await;

        let topics: Vec<String> = (0..2)
            .map(|_| match a_rx.try_recv().unwrap().packet {
                Packet::Publish(p) => format!("{}={}", p.topic, String::from_utf8_lossy(&p.payload)),
                other => panic!("expected PUBLISH, got {:?}", other),
            })
            .collect();
        assert_eq!(topics, vec!["light/1=dim".to_string(), "light/2=off".to_string()]);
    }

    #[tokio::test]
    async fn empty_payload_clears_retained() {
        let registry = SubscriptionRegistry::new();
        registry.submit(&retained("light/1", b"on")).await;
        assert_eq!(registry.retained_count(), 1);
        registry.submit(&retained("light/1", b"")).await;
        assert_eq!(registry.retained_count(), 0);
    }

    #[tokio::test]
    async fn qos_of_publisher_is_preserved() {
        let registry = SubscriptionRegistry::new();
        let (a, mut a_rx) = test_conn(8);
        registry.add("t", &a);

        let mut p = publish("t", b"x");
        p.qos = QoS::AtLeastOnce;
        p.message_id = 5;
        registry.submit(&p).await;

        match a_rx.try_recv().unwrap().packet {
            Packet::Publish(got) => {
                assert_eq!(got.qos, QoS::AtLeastOnce);
                assert_eq!(got.message_id, 5);
            }
            other => panic!("expected PUBLISH, got {:?}", other),
        }
    }
}
