//! API client with transparent authentication and session recovery.
//!
//! Every call runs through a fixed pipeline:
//! augment -> dispatch -> normalize (2xx) or classify -> recover.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::recovery::{classify, FailureKind, InvalidationReason, RecoveryState};
use super::request::augment;
use super::response::{normalize, RawResponse};
use super::{ApiError, ApiResponse, NormalizedError, PendingRequest};
use crate::auth::{Session, SessionEvent};
use crate::config::ClientConfig;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Payload of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Anything else the backend returns (user profile, permissions, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of a non-2xx response after classification.
enum Failure {
    /// Eligible for one refresh-and-replay; carries the original error.
    Expired(NormalizedError),
    Rejected(ApiError),
}

/// Backend client. Clone is cheap - the connection pool, session store and
/// refresh gate are all shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: Arc<ClientConfig>,
    session: Session,
    refresh_gate: Arc<Mutex<()>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
            session,
            refresh_gate: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
        self.send(PendingRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.send(PendingRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.send(PendingRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.send(PendingRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
        self.send(PendingRequest::delete(path)).await
    }

    /// Like [`ApiClient::send`] but returns only the envelope's `data`.
    pub async fn send_data<T: DeserializeOwned>(&self, request: PendingRequest) -> Result<T, ApiError> {
        Ok(self.send(request).await?.data)
    }

    /// Issue a request, refreshing the session at most once on a 401.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: PendingRequest,
    ) -> Result<ApiResponse<T>, ApiError> {
        let request = augment(request, self.session.access_token().as_deref());
        let raw = self.dispatch(&request).await?;
        if raw.status.is_success() {
            return normalize(&raw);
        }

        let original = match self.handle_failure(&request, &raw) {
            Failure::Expired(error) => error,
            Failure::Rejected(error) => return Err(error),
        };

        debug!(
            path = %request.path(),
            state = %RecoveryState::Refreshing,
            "Attempting refresh"
        );
        let request = request.mark_retried();
        let token = match self.refreshed_access_token(&request).await {
            Ok(token) => token,
            Err(reason) => {
                self.terminate(reason);
                return Err(ApiError::RefreshFailed(original));
            }
        };

        let replay = request.with_bearer(&token);
        debug!(path = %replay.path(), state = %RecoveryState::Replayed, "Replaying request");
        let raw = self.dispatch(&replay).await?;
        if raw.status.is_success() {
            return normalize(&raw);
        }

        // The replay carries the retry marker, so it cannot be classified as
        // expired again.
        match self.handle_failure(&replay, &raw) {
            Failure::Expired(error) => Err(ApiError::Application(error)),
            Failure::Rejected(error) => Err(error),
        }
    }

    /// Authenticate and store the returned credentials.
    pub async fn login<B: Serialize + ?Sized>(
        &self,
        credentials: &B,
    ) -> Result<ApiResponse<LoginData>, ApiError> {
        let request = PendingRequest::post(self.config.login_path.as_str()).json(credentials)?;
        let response: ApiResponse<LoginData> = self.send(request).await?;

        self.session.set_tokens(
            &response.data.access_token,
            response.data.refresh_token.as_deref(),
        )?;
        info!("Logged in");
        self.session.notify(SessionEvent::LoggedIn);
        Ok(response)
    }

    /// Soft logout: forget the session locally without signaling invalidation.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.clear()?;
        info!("Logged out");
        self.session.notify(SessionEvent::LoggedOut);
        Ok(())
    }

    fn handle_failure(&self, request: &PendingRequest, raw: &RawResponse) -> Failure {
        let error = NormalizedError::from_response(raw.status, &raw.body);
        match classify(request, raw.status, &error, &self.config) {
            FailureKind::Expired => {
                debug!(
                    path = %request.path(),
                    state = %RecoveryState::AuthFailed,
                    message = %error.message,
                    "Access token rejected"
                );
                Failure::Expired(error)
            }
            FailureKind::InvalidCredential => {
                self.terminate(InvalidationReason::InvalidAccessToken);
                Failure::Rejected(ApiError::InvalidCredential(error))
            }
            FailureKind::Application => {
                debug!(
                    path = %request.path(),
                    status = error.status_code,
                    message = %error.message,
                    "Request failed"
                );
                Failure::Rejected(ApiError::Application(error))
            }
        }
    }

    /// Obtain a new access token for a request that just got a 401.
    ///
    /// With `dedupe_refresh`, concurrent callers queue on the gate and reuse
    /// a token that changed while they waited instead of refreshing again.
    async fn refreshed_access_token(
        &self,
        request: &PendingRequest,
    ) -> Result<String, InvalidationReason> {
        if !self.config.dedupe_refresh {
            return self.refresh().await;
        }

        let _gate = self.refresh_gate.lock().await;
        if let Some(current) = self.session.access_token() {
            if request.bearer_token() != Some(current.as_str()) {
                debug!(path = %request.path(), "Token already refreshed by a concurrent request");
                return Ok(current);
            }
        }
        self.refresh().await
    }

    /// Call the refresh endpoint directly, bypassing the augmenter and the
    /// recovery pipeline.
    async fn refresh(&self) -> Result<String, InvalidationReason> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(InvalidationReason::MissingRefreshToken)?;

        let url = self.config.url_for(&self.config.refresh_path);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Refresh request failed to send");
                InvalidationReason::RefreshFailed
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Refresh endpoint rejected the refresh token");
            return Err(InvalidationReason::RefreshFailed);
        }

        let envelope: ApiResponse<Option<RefreshData>> = response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse refresh response");
            InvalidationReason::RefreshFailed
        })?;

        let data = envelope.data.unwrap_or_default();
        let access_token = data
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                warn!("Refresh response did not include an access token");
                InvalidationReason::RefreshFailed
            })?;

        if let Err(e) = self
            .session
            .set_tokens(&access_token, data.refresh_token.as_deref())
        {
            warn!(error = %e, "Failed to persist refreshed access token");
        }
        info!("Access token refreshed");
        self.session.notify(SessionEvent::Refreshed);
        Ok(access_token)
    }

    /// Hard reset: wipe the whole store and tell observers to route to login.
    fn terminate(&self, reason: InvalidationReason) {
        warn!(reason = %reason, state = %RecoveryState::Terminated, "Session invalidated");
        if let Err(e) = self.session.clear() {
            warn!(error = %e, "Failed to clear session store");
        }
        self.session.notify(SessionEvent::Invalidated {
            reason,
            login_route: self.config.login_route.clone(),
        });
    }

    async fn dispatch(&self, request: &PendingRequest) -> Result<RawResponse, ApiError> {
        let url = self.config.url_for(request.path());

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone());
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(method = %request.method(), url = %url, error = %e, "No response from backend");
            ApiError::Network(e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            warn!(method = %request.method(), url = %url, error = %e, "Failed to read response body");
            ApiError::Network(e)
        })?;

        debug!(
            method = %request.method(),
            url = %url,
            status = status.as_u16(),
            retried = request.is_retried(),
            "Request completed"
        );
        Ok(RawResponse { status, body })
    }
}
