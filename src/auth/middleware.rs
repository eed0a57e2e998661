//! Shared-secret gate for the refresh trigger

use crate::api::ApiError;
use crate::error::RefreshError;
use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Configured trigger secret
#[derive(Clone)]
pub struct UpdateSecret(Arc<str>);

impl UpdateSecret {
    pub fn new(secret: &str) -> Self {
        Self(Arc::from(secret))
    }

    /// Length-independent comparison of the whole secret
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let given = candidate.as_bytes();
        let mut diff = expected.len() ^ given.len();
        for (i, b) in expected.iter().enumerate() {
            diff |= usize::from(b ^ given.get(i).copied().unwrap_or(0));
        }
        diff == 0
    }
}

/// Pull the caller's secret from `?secret=`, `X-Update-Secret` or a bearer token
fn extract_secret(req: &Request) -> Option<String> {
    let from_query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(params)| params.get("secret").cloned());

    let from_header = req
        .headers()
        .get("X-Update-Secret")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let from_bearer = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    from_query.or(from_header).or(from_bearer)
}

/// Rejects the request before any refresh work unless the secret matches
pub async fn require_update_secret(
    State(secret): State<UpdateSecret>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(provided) = extract_secret(&req) else {
        warn!(path = %req.uri().path(), "Rejected refresh trigger without a secret");
        return Err(AuthError::MissingSecret);
    };
    if !secret.matches(&provided) {
        warn!(path = %req.uri().path(), "Rejected refresh trigger with invalid secret");
        return Err(AuthError::InvalidSecret);
    }

    Ok(next.run(req).await)
}

#[derive(Debug)]
pub enum AuthError {
    MissingSecret,
    InvalidSecret,
}

impl From<AuthError> for RefreshError {
    fn from(_: AuthError) -> Self {
        RefreshError::Unauthorized
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(RefreshError::from(self)).into_response()
    }
}
