use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use super::store::{MemorySessionStore, SessionStore, StoreError};
use crate::api::InvalidationReason;

/// Store key holding the access credential
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Store key holding the refresh credential
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session lifecycle notifications for the owning application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    /// Terminal failure: the store has been wiped and the user must sign in
    /// again at `login_route`.
    Invalidated {
        reason: InvalidationReason,
        login_route: String,
    },
}

/// Handle to the session state a client owns.
///
/// Clones share the same store and the same event channel.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { store, events }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Read errors are logged and treated as "no token".
    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(ACCESS_TOKEN_KEY, token)
    }

    /// Store a fresh credential pair. `refresh` of `None` keeps the current one.
    pub fn set_tokens(&self, access: &str, refresh: Option<&str>) -> Result<(), StoreError> {
        self.store.set(ACCESS_TOKEN_KEY, access)?;
        if let Some(refresh) = refresh {
            self.store.set(REFRESH_TOKEN_KEY, refresh)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.set(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.store.remove(key)
    }

    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.store.keys()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Wipe every key, not just the credentials.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.clear()
    }

    pub(crate) fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read session store");
                None
            }
        }
    }
}
