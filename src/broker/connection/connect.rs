//! CONNECT handling: validation, identity takeover, watchdog spawn

use std::time::Duration;

use tracing::{debug, error, warn};

use super::{heartbeat, ConnectInfo, Inbound};
use crate::protocol::{
    ConnAck, Connect, Packet, ReturnCode, MAX_CLIENT_ID_LENGTH, PROTOCOL_NAME, PROTOCOL_VERSION,
};

impl Inbound {
    /// Process a CONNECT, reply with a CONNACK and return the code. The
    /// first failing rule decides the code; later checks do not run.
    pub(crate) async fn do_connect(&mut self, m: Connect) -> ReturnCode {
        let mut rc = ReturnCode::Accepted;

        if m.protocol_name != PROTOCOL_NAME || m.protocol_version != PROTOCOL_VERSION {
            error!(
                "invalid connection[{}] protocol {}, version {}",
                self.conn, m.protocol_name, m.protocol_version
            );
            rc = ReturnCode::UnacceptableProtocolVersion;
        } else if m.client_id.is_empty() || m.client_id.len() > MAX_CLIENT_ID_LENGTH {
            rc = ReturnCode::IdentifierRejected;
        }

        // Recorded before the credential checks so everything from here
        // on logs with a client identity
        self.conn.set_flag(ConnectInfo {
            client_id: m.client_id.clone(),
            keep_alive: m.keep_alive,
            clean_session: m.clean_session,
            will: m.will.is_some(),
            username: m.username.clone(),
        });

        if rc == ReturnCode::Accepted {
            rc = self.check_credentials(&m).await;
        }

        if rc == ReturnCode::Accepted
            && self.config.max_connections > 0
            && self.clients.len() > self.config.max_connections
        {
            rc = ReturnCode::ServerUnavailable;
        }

        // Table membership is granted only on acceptance
        if rc == ReturnCode::Accepted {
            if let Some(existing) = self.clients.add_or_get_existing(&m.client_id, &self.conn) {
                warn!("found dup client: {}", self.conn);

                // Force the existing session out and wait until its
                // writer has processed the disconnect, then take the slot
                existing.submit_sync(Packet::Disconnect).await.wait().await;
                self.clients.remove(&m.client_id, &existing);
                self.clients.insert(&m.client_id, &self.conn);
            }
            self.metrics.set_clients(self.clients.len() as i64);

            if m.keep_alive > 0 {
                tokio::spawn(heartbeat(
                    self.conn.clone(),
                    Duration::from_secs(u64::from(m.keep_alive)),
                    self.metrics.clone(),
                ));
            }

            debug!(
                "new client: {} (c^{}, k^{})",
                self.conn, m.clean_session, m.keep_alive
            );
        }

        self.conn
            .submit(Packet::ConnAck(ConnAck { return_code: rc }))
            .await;

        rc
    }

    async fn check_credentials(&self, m: &Connect) -> ReturnCode {
        let username = m.username.as_deref().unwrap_or("");
        let password = m.password.as_deref().unwrap_or(&[]);

        if !self.config.allow_anonymous_connect && (username.is_empty() || password.is_empty()) {
            return ReturnCode::NotAuthorized;
        }

        if !username.is_empty() && !self.auth.authenticate(username, password).await {
            return ReturnCode::BadUsernameOrPassword;
        }

        ReturnCode::Accepted
    }
}
