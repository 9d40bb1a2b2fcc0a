//! tokenrelay core library.
//!
//! A client-side network access layer for a JSON backend: transparent bearer
//! authentication, a uniform error shape, and one-shot session recovery when
//! the access token expires.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, ApiResponse, Method, NormalizedError, PendingRequest};
pub use auth::{FileSessionStore, MemorySessionStore, Session, SessionEvent, SessionStore};
pub use config::ClientConfig;
