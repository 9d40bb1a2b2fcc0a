//! Outbound request values and the request augmenter.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use tracing::warn;

use super::ApiError;

/// A captured outbound call plus its one-shot retry marker.
///
/// Every stage of the pipeline consumes the value and returns a new one;
/// nothing mutates a request that has already been dispatched.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the Authorization header with a bearer credential.
    /// A token that cannot be encoded as a header value is skipped, not fatal.
    pub fn with_bearer(mut self, token: &str) -> Self {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(header::AUTHORIZATION, value);
            }
            Err(_) => {
                warn!(path = %self.path, "Access token is not a valid header value, sending without it");
            }
        }
        self
    }

    /// Flip the one-shot retry marker.
    pub fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path without any inline query string.
    pub fn route(&self) -> &str {
        self.path
            .split_once('?')
            .map(|(route, _)| route)
            .unwrap_or(&self.path)
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// The bearer token this request will be sent with, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Request augmenter: attach the current access credential, if any.
pub fn augment(request: PendingRequest, access_token: Option<&str>) -> PendingRequest {
    match access_token {
        Some(token) if !token.is_empty() => request.with_bearer(token),
        _ => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augment_sets_bearer() {
        let request = augment(PendingRequest::get("/users/me"), Some("T1"));
        assert_eq!(
            request.headers().get(header::AUTHORIZATION).unwrap(),
            "Bearer T1"
        );
        assert_eq!(request.bearer_token(), Some("T1"));
    }

    #[test]
    fn test_augment_without_token() {
        let request = augment(PendingRequest::get("/public"), None);
        assert!(request.headers().get(header::AUTHORIZATION).is_none());

        let request = augment(PendingRequest::get("/public"), Some(""));
        assert!(request.bearer_token().is_none());
    }

    #[test]
    fn test_with_bearer_replaces_existing() {
        let request = PendingRequest::get("/orders")
            .with_bearer("old")
            .with_bearer("new");
        assert_eq!(request.bearer_token(), Some("new"));
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn test_with_bearer_skips_unencodable_token() {
        let request = PendingRequest::get("/orders").with_bearer("bad\ntoken");
        assert!(request.bearer_token().is_none());
    }

    #[test]
    fn test_mark_retried_is_one_way() {
        let request = PendingRequest::get("/orders");
        assert!(!request.is_retried());
        let request = request.mark_retried();
        assert!(request.is_retried());
        assert!(request.clone().is_retried());
    }

    #[test]
    fn test_route_strips_query() {
        assert_eq!(PendingRequest::get("/auth/login?next=/home").route(), "/auth/login");
        assert_eq!(PendingRequest::get("/auth/login").route(), "/auth/login");
    }

    #[test]
    fn test_json_body_and_query() {
        let request = PendingRequest::post("/items")
            .json(&serde_json::json!({ "name": "widget" }))
            .unwrap()
            .with_query("page", "2");
        assert_eq!(request.body().unwrap()["name"], "widget");
        assert_eq!(request.query(), &[("page".to_string(), "2".to_string())]);
        assert_eq!(request.method(), &Method::POST);
    }
}
