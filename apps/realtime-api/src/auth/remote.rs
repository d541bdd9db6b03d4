//! HTTP client for the storage backend's internal session/access endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::error::ApiError;

use super::{AccessService, Principal};

/// Per-request timeout for access checks.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct SessionResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    allowed: bool,
}

/// Access service reached over HTTP.
///
/// - `GET {base}/internal/sessions/{token}` → `{"user_id": ..}`; 401/404 means
///   no such session.
/// - `GET {base}/internal/files/{file_id}/access/{user_id}` →
///   `{"allowed": bool}`; 403/404 means denied.
///
/// Caller-supplied values are always sent as single percent-encoded path
/// segments.
#[derive(Clone)]
pub struct HttpAccess {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpAccess {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            tracing::error!(?e, "invalid access service URL");
            ApiError::internal("Invalid access service URL")
        })?;
        if base_url.cannot_be_a_base() {
            tracing::error!(%base_url, "access service URL cannot carry a path");
            return Err(ApiError::internal("Invalid access service URL"));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                tracing::error!(?e, "failed to build access service client");
                ApiError::internal("Failed to build access service client")
            })?;

        Ok(Self { base_url, http })
    }

    /// `{base}/seg/seg/..`, each segment encoded so `/`, `?`, `#` and `%`
    /// stay inside it.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::internal("Invalid access service URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, lookup: &'static str) -> Result<reqwest::Response, ApiError> {
        // The URL carries the session token; never log it.
        self.http.get(url).send().await.map_err(|e| {
            tracing::error!(error = %e.without_url(), lookup, "access service request failed");
            ApiError::internal("Access service unavailable")
        })
    }
}

/// Segments the URL encoder would drop or collapse instead of escaping.
fn unroutable(segment: &str) -> bool {
    matches!(segment, "" | "." | "..")
}

#[async_trait]
impl AccessService for HttpAccess {
    async fn resolve(&self, credential: &str) -> Result<Option<Principal>, ApiError> {
        if unroutable(credential) {
            return Ok(None);
        }

        let url = self.endpoint(&["internal", "sessions", credential])?;
        let resp = self.get(url, "session").await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                tracing::error!(%status, "unexpected session lookup status");
                return Err(ApiError::internal("Session lookup failed"));
            }
            _ => {}
        }

        let body: SessionResponse = resp.json().await.map_err(|e| {
            tracing::error!(error = %e.without_url(), "session lookup parse failed");
            ApiError::internal("Session lookup failed")
        })?;

        Ok(Some(Principal {
            user_id: body.user_id,
        }))
    }

    async fn can_observe(&self, principal: &Principal, file_id: &str) -> Result<bool, ApiError> {
        if unroutable(file_id) || unroutable(&principal.user_id) {
            return Ok(false);
        }

        let url = self.endpoint(&["internal", "files", file_id, "access", &principal.user_id])?;
        let resp = self.get(url, "file access").await?;

        match resp.status() {
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => return Ok(false),
            status if !status.is_success() => {
                tracing::error!(%status, %file_id, "unexpected access check status");
                return Err(ApiError::internal("Access check failed"));
            }
            _ => {}
        }

        let body: AccessResponse = resp.json().await.map_err(|e| {
            tracing::error!(error = %e.without_url(), "access check parse failed");
            ApiError::internal("Access check failed")
        })?;

        Ok(body.allowed)
    }
}
