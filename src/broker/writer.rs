//! Outbound half of a connection: the single sequential writer
//!
//! Drains the bounded job queue until the inbound loop closes it. Each
//! job is persisted, encoded and written under a deadline; its receipt
//! is released whatever the outcome. On exit the deferred cleanup stops
//! the watchdog, closes the transport (which wakes a blocked reader) and
//! deregisters the connection from the client table and the registry.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::connection::Job;
use super::{BrokerConfig, ClientTable, Connection};
use crate::buffer_pool;
use crate::codec::Encoder;
use crate::metrics::Metrics;
use crate::persistence::Store;
use crate::protocol::Packet;
use crate::topic::SubscriptionRegistry;

pub(crate) struct Outbound {
    pub(crate) conn: Arc<Connection>,
    pub(crate) writer: OwnedWriteHalf,
    pub(crate) jobs: mpsc::Receiver<Job>,
    pub(crate) write_buf: BytesMut,
    pub(crate) encoder: Encoder,
    pub(crate) config: Arc<BrokerConfig>,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) clients: Arc<ClientTable>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) metrics: Arc<Metrics>,
}

impl Outbound {
    pub(crate) async fn run(mut self) {
        self.write_loop().await;

        // Teardown, second half. Only the outbound loop touches the
        // transport: stop the watchdog, half-close the socket, wake a
        // reader that would otherwise stay blocked, then deregister.
        self.conn.heartbeat_stop.notify_one();
        let _ = self.writer.shutdown().await;
        self.conn.transport_closed.notify_one();
        debug!("{} conn closed", self.conn);

        if let Some(client_id) = self.conn.client_id() {
            self.clients.remove(&client_id, &self.conn);
            self.metrics.set_clients(self.clients.len() as i64);
        }
        self.registry.unsub_all(&self.conn);
        buffer_pool::put_buffer(std::mem::take(&mut self.write_buf));
    }

    async fn write_loop(&mut self) {
        let mut total: u64 = 0;
        let mut slow: u64 = 0;

        while let Some(job) = self.jobs.recv().await {
            if self.config.echo {
                debug!("{} <- {:?}", self.conn, job.packet);
            }

            if let Err(e) = self.store.persist_outbound(&job.packet) {
                warn!("{} persist outbound: {}", self.conn, e);
            }

            let started = Instant::now();
            let result = self.write_frame(&job.packet).await;
            let elapsed = started.elapsed();

            if let Some(receipt) = job.receipt {
                // released regardless of the write outcome
                let _ = receipt.send(());
            }

            if let Err(e) = result {
                error!("client[{}]: {}, {:?}", self.conn, e, elapsed);
                return;
            }

            total += 1;
            if elapsed > self.config.client_slow_threshold {
                slow += 1;
                self.metrics.slow_write();
                warn!("slow client[{}] {}/{}, {:?}", self.conn, slow, total, elapsed);
            }

            self.metrics.message_send();
            self.metrics.add_out(&job.packet);

            if matches!(job.packet, Packet::Disconnect) {
                return;
            }
        }
        // recv returned None: the queue was closed by the inbound loop
    }

    async fn write_frame(&mut self, packet: &Packet) -> io::Result<()> {
        self.write_buf.clear();
        self.encoder
            .encode(packet, &mut self.write_buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        match timeout(self.config.io_timeout, self.writer.write_all(&self.write_buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "write deadline exceeded",
            )),
        }
    }
}
