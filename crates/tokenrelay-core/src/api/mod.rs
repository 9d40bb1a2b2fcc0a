//! Backend access layer.
//!
//! This module provides the `ApiClient`, which attaches the stored bearer
//! token to every call, unwraps the backend's success envelope, and recovers
//! from an expired access token with a single refresh-and-replay.
//!
//! Every failure reaches the caller as an `ApiError` whose `normalized()`
//! form is the `{statusCode, message, errors, success: false}` shape.

pub mod client;
pub mod error;
pub mod recovery;
pub mod request;
pub mod response;

pub use client::{ApiClient, LoginData};
pub use error::{ApiError, NormalizedError};
pub use recovery::{InvalidationReason, RecoveryState};
pub use request::PendingRequest;
pub use response::ApiResponse;
pub use reqwest::Method;
