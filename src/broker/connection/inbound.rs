//! Inbound half of a connection: the single sequential reader
//!
//! Decodes one frame at a time, refreshes the activity timestamp and
//! dispatches by packet type. On exit its deferred cleanup closes the
//! persistence store, drops liveness and closes the outbound queue,
//! which is what terminates the outbound loop.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, error, warn};

use super::Connection;
use crate::auth::Authenticator;
use crate::broker::{BrokerConfig, ClientTable};
use crate::buffer_pool;
use crate::codec::Decoder;
use crate::metrics::Metrics;
use crate::persistence::Store;
use crate::protocol::{DecodeError, Packet, ReturnCode};
use crate::remote::PeerRouter;
use crate::topic::SubscriptionRegistry;

pub(crate) enum ReadError {
    /// Peer closed the stream cleanly
    Eof,
    Io(std::io::Error),
    Decode(DecodeError),
}

pub(crate) struct Inbound {
    pub(crate) conn: Arc<Connection>,
    pub(crate) reader: OwnedReadHalf,
    pub(crate) read_buf: BytesMut,
    pub(crate) decoder: Decoder,
    pub(crate) config: Arc<BrokerConfig>,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) clients: Arc<ClientTable>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) auth: Arc<dyn Authenticator>,
    pub(crate) peers: Arc<dyn PeerRouter>,
    pub(crate) metrics: Arc<Metrics>,
}

impl Inbound {
    pub(crate) async fn run(mut self) {
        self.read_loop().await;

        // Teardown, first half: account the session, close the store,
        // drop liveness, then close the queue to terminate the outbound
        // loop. Only the inbound loop closes the queue.
        self.metrics.client_disconnect();
        self.store.close();
        self.conn.mark_dead();
        self.conn.close_jobs();
        buffer_pool::put_buffer(std::mem::take(&mut self.read_buf));
    }

    async fn read_loop(&mut self) {
        loop {
            let conn = self.conn.clone();
            let packet = tokio::select! {
                res = next_packet(&mut self.reader, &mut self.read_buf, &self.decoder) => {
                    match res {
                        Ok(packet) => packet,
                        Err(ReadError::Eof) => {
                            debug!("{} closed by peer", conn);
                            self.metrics.aborted();
                            return;
                        }
                        Err(ReadError::Io(e)) => {
                            error!("{}: {}", e, conn);
                            self.metrics.aborted();
                            return;
                        }
                        Err(ReadError::Decode(e)) => {
                            error!("{}: {}", e, conn);
                            self.metrics.aborted();
                            return;
                        }
                    }
                }
                _ = conn.transport_closed.notified() => {
                    // The outbound loop shut the transport down; whoever
                    // initiated that already did the accounting.
                    return;
                }
            };

            self.metrics.message_recv();
            self.metrics.add_in(&packet);
            self.conn.touch();

            if self.config.echo {
                debug!("{} -> {:?}", self.conn, packet);
            }

            match packet {
                Packet::Connect(connect) => {
                    if self.conn.connected() {
                        warn!("{} duplicate CONNECT", self.conn);
                        return;
                    }
                    let rc = self.do_connect(*connect).await;
                    if rc != ReturnCode::Accepted {
                        error!("{}: {}", rc, self.conn);
                        return;
                    }
                }

                _ if !self.conn.connected() => {
                    warn!("{} -> {} before CONNECT", self.conn, packet.kind());
                    return;
                }

                Packet::Publish(publish) => self.do_publish(publish).await,
                Packet::Subscribe(subscribe) => self.do_subscribe(subscribe).await,
                Packet::Unsubscribe(unsubscribe) => self.do_unsubscribe(unsubscribe).await,
                Packet::PubAck(ack) => self.do_publish_ack(&ack),

                Packet::PingReq => {
                    // the broker never pings the client
                    self.conn.submit(Packet::PingResp).await;
                }

                Packet::Disconnect => {
                    debug!("{} actively disconnected", self.conn);
                    return;
                }

                other => {
                    warn!("{} -> unexpected {}", self.conn, other.kind());
                    return;
                }
            }
        }
    }
}

/// Pull bytes until one complete frame decodes. Leftover bytes stay in
/// the buffer for the next call.
async fn next_packet(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    decoder: &Decoder,
) -> Result<Packet, ReadError> {
    loop {
        match decoder.decode(buf) {
            Ok(Some((packet, consumed))) => {
                buf.advance(consumed);
                return Ok(packet);
            }
            Ok(None) => {}
            Err(e) => return Err(ReadError::Decode(e)),
        }

        let n = reader.read_buf(buf).await.map_err(ReadError::Io)?;
        if n == 0 {
            return Err(ReadError::Eof);
        }
    }
}
