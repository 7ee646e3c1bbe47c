//! SUBSCRIBE and UNSUBSCRIBE handling

use super::Inbound;
use crate::protocol::{Packet, QoS, SubAck, Subscribe, UnsubAck, Unsubscribe};

impl Inbound {
    pub(crate) async fn do_subscribe(&mut self, m: Subscribe) {
        let mut granted = Vec::with_capacity(m.topics.len());
        for tq in &m.topics {
            // TODO: grant the requested QoS once delivery can honor it;
            // for now every subscription is downgraded to at-most-once
            self.registry.add(&tq.topic, &self.conn);
            granted.push(QoS::AtMostOnce);
        }

        self.conn
            .submit(Packet::SubAck(SubAck {
                message_id: m.message_id,
                granted_qos: granted,
            }))
            .await;

        // Publishes may reach the subscriber before it observes the
        // SUBACK; retained replays are queued strictly after it
        for tq in &m.topics {
            self.registry.send_retain(&tq.topic, &self.conn).await;
        }
    }

    pub(crate) async fn do_unsubscribe(&mut self, m: Unsubscribe) {
        for topic in &m.topics {
            self.registry.unsub(topic, &self.conn);
        }

        self.conn
            .submit(Packet::UnsubAck(UnsubAck {
                message_id: m.message_id,
            }))
            .await;
    }
}
