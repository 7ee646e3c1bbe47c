//! Broker statistics
//!
//! The stats interface the engine calls, backed by a Prometheus
//! registry so the numbers double as the `/metrics` payload.

mod server;

pub use server::MetricsServer;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::protocol::Packet;

pub struct Metrics {
    pub registry: Registry,

    /// Currently registered client sessions; mirrors the client table
    clients_current: IntGauge,
    /// Sessions that ended, clean or not
    disconnections_total: IntCounter,
    /// Abnormal terminations: decode/IO failures and keep-alive kicks
    aborted_total: IntCounter,

    messages_received_total: IntCounter,
    messages_sent_total: IntCounter,
    messages_received_by_type: IntCounterVec,
    messages_sent_by_type: IntCounterVec,

    /// Writes slower than the configured threshold
    slow_writes_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let clients_current = IntGauge::with_opts(Opts::new(
            "embermq_clients_current",
            "Currently registered client sessions",
        ))
        .unwrap();

        let disconnections_total = IntCounter::with_opts(Opts::new(
            "embermq_disconnections_total",
            "Client sessions ended since startup",
        ))
        .unwrap();

        let aborted_total = IntCounter::with_opts(Opts::new(
            "embermq_aborted_total",
            "Sessions terminated abnormally since startup",
        ))
        .unwrap();

        let messages_received_total = IntCounter::with_opts(Opts::new(
            "embermq_messages_received_total",
            "Packets received, all types",
        ))
        .unwrap();

        let messages_sent_total = IntCounter::with_opts(Opts::new(
            "embermq_messages_sent_total",
            "Packets written, all types",
        ))
        .unwrap();

        let messages_received_by_type = IntCounterVec::new(
            Opts::new(
                "embermq_messages_received_by_type",
                "Packets received by packet type",
            ),
            &["type"],
        )
        .unwrap();

        let messages_sent_by_type = IntCounterVec::new(
            Opts::new(
                "embermq_messages_sent_by_type",
                "Packets written by packet type",
            ),
            &["type"],
        )
        .unwrap();

        let slow_writes_total = IntCounter::with_opts(Opts::new(
            "embermq_slow_writes_total",
            "Writes that exceeded the slow-client threshold",
        ))
        .unwrap();

        for collector in [
            Box::new(clients_current.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(disconnections_total.clone()),
            Box::new(aborted_total.clone()),
            Box::new(messages_received_total.clone()),
            Box::new(messages_sent_total.clone()),
            Box::new(messages_received_by_type.clone()),
            Box::new(messages_sent_by_type.clone()),
            Box::new(slow_writes_total.clone()),
        ] {
            registry.register(collector).unwrap();
        }

        Self {
            registry,
            clients_current,
            disconnections_total,
            aborted_total,
            messages_received_total,
            messages_sent_total,
            messages_received_by_type,
            messages_sent_by_type,
            slow_writes_total,
        }
    }

    /// Current client count as last reported by the table
    pub fn clients(&self) -> i64 {
        self.clients_current.get()
    }

    pub fn set_clients(&self, count: i64) {
        self.clients_current.set(count);
    }

    pub fn client_disconnect(&self) {
        self.disconnections_total.inc();
    }

    pub fn aborted(&self) {
        self.aborted_total.inc();
    }

    pub fn message_recv(&self) {
        self.messages_received_total.inc();
    }

    pub fn message_send(&self) {
        self.messages_sent_total.inc();
    }

    pub fn add_in(&self, packet: &Packet) {
        self.messages_received_by_type
            .with_label_values(&[packet.kind()])
            .inc();
    }

    pub fn add_out(&self, packet: &Packet) {
        self.messages_sent_by_type
            .with_label_values(&[packet.kind()])
            .inc();
    }

    pub fn slow_write(&self) {
        self.slow_writes_total.inc();
    }

    #[cfg(test)]
    pub(crate) fn aborted_count(&self) -> u64 {
        self.aborted_total.get()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
