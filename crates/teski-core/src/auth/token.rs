use std::sync::Arc;

use tracing::debug;

use crate::store::{KeyValueStore, StoreError};

/// Storage key for the persisted bearer token.
pub const AUTH_TOKEN_KEY: &str = "teski.authToken";

#[derive(Clone)]
pub struct AuthTokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl AuthTokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Current token, if any. Unreadable storage reads as logged out.
    pub fn token(&self) -> Option<String> {
        match self.store.get(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                debug!(error = %e, "Failed to read auth token");
                None
            }
        }
    }

    pub fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(AUTH_TOKEN_KEY, token)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(AUTH_TOKEN_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}
