//! Peer forwarding seam
//!
//! Publishes on globally-scoped topics are handed to a [`PeerRouter`]
//! after local fan-out. Replication itself lives outside this core; the
//! default router drops everything.

use async_trait::async_trait;
use tracing::trace;

use crate::protocol::Publish;

/// Receives publishes whose topic is globally scoped
#[async_trait]
pub trait PeerRouter: Send + Sync {
    async fn submit(&self, publish: &Publish);
}

/// No peers: forwarded publishes are dropped
pub struct NoopPeers;

#[async_trait]
impl PeerRouter for NoopPeers {
    async fn submit(&self, publish: &Publish) {
        trace!("no peers, dropping forward of {}", publish.topic);
    }
}

/// A topic is global when it carries one of the configured prefixes.
/// An empty prefix list scopes everything locally.
pub fn is_global_topic(prefixes: &[String], topic: &str) -> bool {
    prefixes.iter().any(|prefix| topic.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_list_decides_scope() {
        let prefixes = vec!["global/".to_string(), "fleet/".to_string()];
        assert!(is_global_topic(&prefixes, "global/alerts"));
        assert!(is_global_topic(&prefixes, "fleet/7/status"));
        assert!(!is_global_topic(&prefixes, "room/1"));
        assert!(!is_global_topic(&[], "global/alerts"));
    }
}
