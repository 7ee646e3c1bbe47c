//! Per-connection state shared between the inbound and outbound loops
//!
//! A `Connection` is the handle the registry and client table hold: the
//! negotiated CONNECT parameters, the liveness flag, the last-activity
//! timestamp and the sending side of the bounded outbound job queue.
//! The queue is closed by the inbound loop and only the inbound loop;
//! the transport is closed by the outbound loop and only the outbound
//! loop.

mod connect;
mod inbound;
mod publish;
mod subscribe;

pub(crate) use inbound::Inbound;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, warn};

use crate::broker::OverflowStrategy;
use crate::metrics::Metrics;
use crate::protocol::Packet;

/// Negotiated CONNECT parameters, absent until CONNECT is processed.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: bool,
    pub username: Option<String>,
}

/// An outbound work item: a packet plus an optional one-shot receipt
/// released once the packet's encode-and-write completes, successfully
/// or not.
pub struct Job {
    pub packet: Packet,
    pub receipt: Option<oneshot::Sender<()>>,
}

/// Resolves when the corresponding job has been processed by the
/// outbound loop (or when the queue is already gone).
pub struct Receipt(Option<oneshot::Receiver<()>>);

impl Receipt {
    fn ready() -> Self {
        Receipt(None)
    }

    pub async fn wait(self) {
        if let Some(rx) = self.0 {
            // An error just means the outbound loop dropped the sender,
            // which is as final as a signal
            let _ = rx.await;
        }
    }
}

/// One client session as seen by the rest of the broker.
pub struct Connection {
    addr: SocketAddr,
    /// None until CONNECT has been processed; set exactly once
    flag: RwLock<Option<ConnectInfo>>,
    alive: AtomicBool,
    /// Unix timestamp of the last observed activity
    last_activity: AtomicI64,
    /// Sending side of the outbound queue; taken by the inbound loop's
    /// cleanup to close the queue
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    overflow: OverflowStrategy,
    /// Outbound -> heartbeat stop signal
    pub(crate) heartbeat_stop: Notify,
    /// Outbound -> inbound wake signal; a half-closed socket does not
    /// interrupt a blocked read, so the writer wakes the reader explicitly
    pub(crate) transport_closed: Notify,
}

impl Connection {
    pub(crate) fn new(
        addr: SocketAddr,
        jobs: mpsc::Sender<Job>,
        overflow: OverflowStrategy,
    ) -> Self {
        Self {
            addr,
            flag: RwLock::new(None),
            alive: AtomicBool::new(true),
            last_activity: AtomicI64::new(unix_now()),
            jobs: Mutex::new(Some(jobs)),
            overflow,
            heartbeat_stop: Notify::new(),
            transport_closed: Notify::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connected(&self) -> bool {
        self.flag.read().is_some()
    }

    pub fn flag(&self) -> Option<ConnectInfo> {
        self.flag.read().clone()
    }

    pub fn client_id(&self) -> Option<String> {
        self.flag.read().as_ref().map(|f| f.client_id.clone())
    }

    /// Record the negotiated CONNECT parameters. The transition is
    /// one-way; a second call is ignored.
    pub(crate) fn set_flag(&self, info: ConnectInfo) {
        let mut flag = self.flag.write();
        if flag.is_some() {
            warn!("{} CONNECT parameters already set", self.addr);
            return;
        }
        *flag = Some(info);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Liveness goes false before the queue closes, so a submit that
    /// still observes a stale true can at worst enqueue into a queue the
    /// outbound loop is about to drain.
    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn touch(&self) {
        self.last_activity.store(unix_now(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Close the outbound queue. Inbound-loop cleanup only.
    pub(crate) fn close_jobs(&self) {
        self.jobs.lock().take();
    }

    /// Enqueue a packet for the outbound loop, honoring the configured
    /// overflow strategy.
    pub async fn submit(&self, packet: Packet) {
        if !self.is_alive() {
            debug!("{} submit on dead connection: {}", self, packet.kind());
            return;
        }

        let Some(tx) = self.jobs.lock().clone() else {
            return;
        };

        match self.overflow {
            OverflowStrategy::Block => {
                let _ = tx
                    .send(Job {
                        packet,
                        receipt: None,
                    })
                    .await;
            }
            OverflowStrategy::Discard => {
                if let Err(mpsc::error::TrySendError::Full(job)) = tx.try_send(Job {
                    packet,
                    receipt: None,
                }) {
                    debug!(
                        "{} outbound queue full, discarding {}",
                        self,
                        job.packet.kind()
                    );
                }
            }
        }
    }

    /// Enqueue a packet and return a receipt for its completion. Always
    /// blocks for queue space; must not be called under a lock the
    /// outbound loop might need.
    pub async fn submit_sync(&self, packet: Packet) -> Receipt {
        let (done_tx, done_rx) = oneshot::channel();

        let Some(tx) = self.jobs.lock().clone() else {
            return Receipt::ready();
        };

        match tx
            .send(Job {
                packet,
                receipt: Some(done_tx),
            })
            .await
        {
            Ok(()) => Receipt(Some(done_rx)),
            Err(_) => Receipt::ready(),
        }
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.flag.read().as_ref() {
            Some(info) => write!(f, "{}@{}", info.client_id, self.addr),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// Idle watchdog: every `keep_alive` seconds compare the connection's
/// last activity against a 1.5x grace window and kick the client when it
/// is exceeded. Exits on the stop signal from the outbound loop.
pub(crate) async fn heartbeat(conn: Arc<Connection>, keep_alive: Duration, metrics: Arc<Metrics>) {
    let mut ticker = tokio::time::interval(keep_alive);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // 1.5x the keep-alive timer is the grace the protocol mandates
                let deadline = conn.last_activity() as f64 + keep_alive.as_secs_f64() * 1.5;
                let over_idle = unix_now() as f64 - deadline;
                if over_idle > 0.0 && conn.is_alive() {
                    conn.submit_sync(Packet::Disconnect).await.wait().await;
                    warn!("{} over idle {:.0}s, kicked out", conn, over_idle);
                    metrics.aborted();
                    return;
                }
            }
            _ = conn.heartbeat_stop.notified() => {
                debug!("{} heartbeat stopped", conn);
                return;
            }
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
