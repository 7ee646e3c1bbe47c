//! PUBLISH and PUBACK handling

use tracing::{error, warn};

use super::Inbound;
use crate::protocol::{Packet, PubAck, Publish, QoS};
use crate::remote::is_global_topic;

impl Inbound {
    pub(crate) async fn do_publish(&mut self, m: Publish) {
        if let Err(e) = self.store.persist_inbound(&Packet::Publish(m.clone())) {
            warn!("{} persist inbound: {}", self.conn, e);
        }

        // Replicate to every local subscriber of this topic
        self.registry.submit(&m).await;

        if is_global_topic(&self.config.global_topic_prefixes, &m.topic) {
            self.peers.submit(&m).await;
        }

        match m.qos {
            QoS::AtLeastOnce => {
                if m.message_id == 0 {
                    error!("client[{}] invalid message id", self.conn);
                }
                self.conn
                    .submit(Packet::PubAck(PubAck {
                        message_id: m.message_id,
                    }))
                    .await;
            }
            // QoS 0 needs no acknowledgement; the QoS 2 flow is not
            // implemented
            QoS::AtMostOnce | QoS::ExactlyOnce => {}
        }
    }

    pub(crate) fn do_publish_ack(&self, _ack: &PubAck) {
        // TODO: clear the matching entry once an outbound in-flight
        // table exists; until then QoS 1 acks carry no state
    }
}
