//! Session credential extraction for the upgrade endpoint.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::ApiError;

/// Session token presented by the client, from `?token=` or
/// `Authorization: Bearer <token>`.
///
/// Browsers cannot set headers on a WebSocket handshake, so the query
/// parameter is checked first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(pub String);

#[derive(Debug, Deserialize)]
struct CredentialQuery {
    token: Option<String>,
}

impl Credential {
    fn from_parts(parts: &Parts) -> Option<Self> {
        let from_query = Query::<CredentialQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token);

        let token =
            from_query.or_else(|| bearer_token(&parts.headers).map(str::to_string))?;

        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }
}

/// The token from `Authorization: Bearer <token>`, trimmed. Blank is `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts).ok_or_else(|| ApiError::unauthorized("token required"))
    }
}
