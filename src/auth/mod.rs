//! Authentication
//!
//! The engine consults an [`Authenticator`] whenever a CONNECT carries
//! credentials. The default allows everything; [`StaticAuth`] checks a
//! configured user list.

use std::collections::HashMap;

use async_trait::async_trait;

/// Credential check performed during CONNECT
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// True if the pair is valid
    async fn authenticate(&self, username: &str, password: &[u8]) -> bool;
}

/// Accepts any credentials
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn authenticate(&self, _username: &str, _password: &[u8]) -> bool {
        true
    }
}

/// Static username/password list from configuration
pub struct StaticAuth {
    users: HashMap<String, String>,
}

impl StaticAuth {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl Authenticator for StaticAuth {
    async fn authenticate(&self, username: &str, password: &[u8]) -> bool {
        let Some(stored) = self.users.get(username) else {
            return false;
        };
        match std::str::from_utf8(password) {
            Ok(given) => given == stored,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_auth() -> StaticAuth {
        StaticAuth::new(HashMap::from([(
            "alice".to_string(),
            "wonderland".to_string(),
        )]))
    }

    #[tokio::test]
    async fn allow_all_accepts_anything() {
        assert!(AllowAll.authenticate("anyone", b"anything").await);
        assert!(AllowAll.authenticate("", b"").await);
    }

    #[tokio::test]
    async fn static_auth_checks_the_pair() {
        let auth = static_auth();
        assert!(auth.authenticate("alice", b"wonderland").await);
        assert!(!auth.authenticate("alice", b"looking-glass").await);
        assert!(!auth.authenticate("bob", b"wonderland").await);
        assert!(!auth.authenticate("alice", &[0xFF, 0xFE]).await);
    }
}
