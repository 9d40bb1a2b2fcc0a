//! Failure classification for the session recovery protocol.
//!
//! A rejected request moves through
//! `AuthFailed -> Refreshing -> {Replayed | Terminated}`.
//! [`classify`] decides whether it enters that path; the client drives the rest.

use std::fmt;

use reqwest::StatusCode;

use super::{NormalizedError, PendingRequest};
use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    AuthFailed,
    Refreshing,
    Replayed,
    Terminated,
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryState::AuthFailed => "auth_failed",
            RecoveryState::Refreshing => "refreshing",
            RecoveryState::Replayed => "replayed",
            RecoveryState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// How a non-2xx response is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Backend flagged the token as malformed. Terminate, never refresh.
    InvalidCredential,
    /// Plain 401 on a request still eligible for one refresh-and-replay.
    Expired,
    /// Everything else. Reported to the caller as-is.
    Application,
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    InvalidAccessToken,
    MissingRefreshToken,
    RefreshFailed,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidationReason::InvalidAccessToken => "invalid access token",
            InvalidationReason::MissingRefreshToken => "no refresh token stored",
            InvalidationReason::RefreshFailed => "refresh request failed",
        };
        f.write_str(s)
    }
}

pub fn classify(
    request: &PendingRequest,
    status: StatusCode,
    error: &NormalizedError,
    config: &ClientConfig,
) -> FailureKind {
    if error.is_invalid_access_token() {
        return FailureKind::InvalidCredential;
    }

    if status == StatusCode::UNAUTHORIZED
        && !request.is_retried()
        && !config.is_auth_endpoint(request.route())
    {
        return FailureKind::Expired;
    }

    FailureKind::Application
}
