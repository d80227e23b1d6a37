use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::api::auth::{CurrentUser, SignedIn};
use crate::cache::Query;
use crate::db::models::{Profile, TicketWithRaffle};
use crate::error::{Result, StorefrontError};
use crate::raffle::TicketSummary;

// the /me routes answer {"status": "idle"} when nobody is signed in

pub async fn my_tickets(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Query<Vec<TicketWithRaffle>>>> {
    let tickets = state
        .raffle_manager
        .user_tickets(session.map(|s| s.user_id))
        .await?;

    Ok(Json(tickets))
}

pub async fn my_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Query<Option<Profile>>>> {
    let profile = state
        .raffle_manager
        .profile(session.map(|s| s.user_id))
        .await?;

    Ok(Json(profile))
}

pub async fn my_ticket_summary(
    State(state): State<Arc<AppState>>,
    SignedIn(session): SignedIn,
) -> Result<Json<TicketSummary>> {
    Ok(Json(state.raffle_manager.ticket_summary(session.user_id).await?))
}

#[derive(Debug, Serialize)]
pub struct TicketsResponse {
    pub tickets: Vec<TicketWithRaffle>,
}

pub async fn user_tickets(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<TicketsResponse>> {
    let tickets = state
        .raffle_manager
        .user_tickets(Some(user_id))
        .await?
        .ready()
        .unwrap_or_default();

    Ok(Json(TicketsResponse { tickets }))
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Profile>> {
    let profile = state
        .raffle_manager
        .profile(Some(user_id))
        .await?
        .ready()
        .flatten()
        .ok_or_else(|| StorefrontError::NotFound(format!("Profile {}", user_id)))?;

    Ok(Json(profile))
}
