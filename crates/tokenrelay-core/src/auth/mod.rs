//! Session state and credential storage.
//!
//! This module provides:
//! - `Session`: the client-owned handle over access/refresh credentials,
//!   with a broadcast channel for lifecycle events
//! - `SessionStore`: pluggable key-value persistence (`MemorySessionStore`,
//!   `FileSessionStore`)
//! - `CredentialStore`: saved login passwords via the OS keyring

pub mod credentials;
pub mod session;
pub mod store;

pub use credentials::CredentialStore;
pub use session::{Session, SessionEvent, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError};
