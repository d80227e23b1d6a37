use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;

use crate::AppState;
use crate::error::StorefrontError;
use crate::session::Session;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// The held session, if any. Once someone is signed in, a request only gets
/// through when it carries that session's access token as `Bearer`.
pub struct CurrentUser(pub Option<Session>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = StorefrontError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(session) = state.session.current() else {
            return Ok(CurrentUser(None));
        };

        match bearer_token(&parts.headers) {
            Some(token) if token == session.access_token => Ok(CurrentUser(Some(session))),
            Some(_) => Err(StorefrontError::Unauthorized(
                "Bearer token does not match the active session".to_string(),
            )),
            None => Err(StorefrontError::Unauthorized(
                "Missing bearer token".to_string(),
            )),
        }
    }
}

/// Like [`CurrentUser`] but requires a session.
pub struct SignedIn(pub Session);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SignedIn {
    type Rejection = StorefrontError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(session) = CurrentUser::from_request_parts(parts, state).await?;

        session
            .map(SignedIn)
            .ok_or_else(|| StorefrontError::Unauthorized("Not signed in".to_string()))
    }
}
