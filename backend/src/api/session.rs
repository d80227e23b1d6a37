use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::api::auth::CurrentUser;
use crate::error::{Result, StorefrontError};
use crate::session::Session;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub signed_in: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
}

impl From<Option<Session>> for SessionResponse {
    fn from(session: Option<Session>) -> Self {
        match session {
            Some(session) => Self {
                signed_in: true,
                user_id: Some(session.user_id),
                email: session.email,
            },
            None => Self {
                signed_in: false,
                user_id: None,
                email: None,
            },
        }
    }
}

pub async fn current(CurrentUser(session): CurrentUser) -> Json<SessionResponse> {
    Json(session.into())
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub user_id: Uuid,
    pub access_token: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Stores a session obtained from the auth service. The token is forwarded
/// as-is on every data request; it is not verified here. Replacing an active
/// session takes that session's token.
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    CurrentUser(_previous): CurrentUser,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SessionResponse>> {
    let access_token = request.access_token.trim();
    if access_token.is_empty() {
        return Err(StorefrontError::InvalidInput("access_token must not be empty".to_string()));
    }

    state.session.sign_in(Session {
        user_id: request.user_id,
        access_token: access_token.to_string(),
        email: request.email,
    });

    Ok(Json(state.session.current().into()))
}

pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    CurrentUser(_session): CurrentUser,
) -> Json<SessionResponse> {
    state.session.sign_out();

    Json(SessionResponse::from(None))
}
