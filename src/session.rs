//! Registered-user credentials and the request headers derived from them.

use popin_core::types::RegisteredUser;
use std::sync::RwLock;

/// Supplies headers attached to every API request.
pub trait HeadersProvider: Send + Sync {
    fn headers(&self) -> Vec<(String, String)>;
}

/// In-memory holder for the registered user.
#[derive(Debug, Default)]
pub struct SessionStore {
    user: RwLock<Option<RegisteredUser>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(user: RegisteredUser) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn save_user(&self, user: RegisteredUser) {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = Some(user);
    }

    pub fn clear(&self) {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn user(&self) -> Option<RegisteredUser> {
        self.user.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Bearer token, empty when nobody is registered.
    pub fn token(&self) -> String {
        self.user().map(|u| u.token).unwrap_or_default()
    }

    /// Pub/sub channel of the registered user, empty when unknown.
    pub fn channel(&self) -> String {
        self.user().map(|u| u.channel).unwrap_or_default()
    }

    pub fn is_registered(&self) -> bool {
        !self.token().is_empty()
    }
}

impl HeadersProvider for SessionStore {
    fn headers(&self) -> Vec<(String, String)> {
        let token = self.token();
        if token.is_empty() {
            return Vec::new();
        }
        vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {token}")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(token: &str) -> RegisteredUser {
        RegisteredUser {
            status: 1,
            token: token.to_string(),
            channel: "private-user.17".to_string(),
        }
    }

    #[test]
    fn no_headers_without_token() {
        let store = SessionStore::new();
        assert!(!store.is_registered());
        assert!(store.headers().is_empty());
    }

    #[test]
    fn bearer_header_once_registered() {
        let store = SessionStore::new();
        store.save_user(user("tok-1"));
        assert!(store.is_registered());
        assert_eq!(store.channel(), "private-user.17");
        let headers = store.headers();
        assert!(headers.contains(&("Authorization".to_string(), "Bearer tok-1".to_string())));
        assert!(headers.contains(&("Accept".to_string(), "application/json".to_string())));

        store.clear();
        assert!(store.headers().is_empty());
    }

    #[test]
    fn empty_token_counts_as_unregistered() {
        let store = SessionStore::with_user(user(""));
        assert!(!store.is_registered());
    }
}
