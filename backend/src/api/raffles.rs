use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::api::auth::SignedIn;
use crate::db::models::{Raffle, Ticket, TimeRemaining};
use crate::error::{Result, StorefrontError};

/// A raffle with the figures the listing cards show.
#[derive(Debug, Serialize)]
pub struct RaffleView {
    #[serde(flatten)]
    pub raffle: Raffle,
    pub progress_percent: f64,
    pub time_remaining: TimeRemaining,
}

impl From<Raffle> for RaffleView {
    fn from(raffle: Raffle) -> Self {
        let now = Utc::now();
        Self {
            progress_percent: raffle.progress_percent(),
            time_remaining: raffle.time_remaining(now),
            raffle,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RafflesResponse {
    pub raffles: Vec<RaffleView>,
}

pub async fn list_active(State(state): State<Arc<AppState>>) -> Result<Json<RafflesResponse>> {
    let raffles = state.raffle_manager.active_raffles().await?;

    Ok(Json(RafflesResponse {
        raffles: raffles.into_iter().map(RaffleView::from).collect(),
    }))
}

pub async fn get_raffle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RaffleView>> {
    let raffle = state
        .raffle_manager
        .raffle(id)
        .await?
        .ok_or_else(|| StorefrontError::NotFound(format!("Raffle {}", id)))?;

    Ok(Json(RaffleView::from(raffle)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurchaseBody {
    #[serde(default)]
    pub count: Option<u32>,
}

/// An empty body buys one ticket. Anything else has to be a JSON
/// `PurchaseBody` sent as `application/json`.
fn purchase_count(headers: &HeaderMap, body: &[u8]) -> Result<u32> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(1);
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
    if !is_json {
        return Err(StorefrontError::InvalidInput(
            "Expected Content-Type: application/json".to_string(),
        ));
    }

    let body: PurchaseBody = serde_json::from_slice(body)
        .map_err(|e| StorefrontError::InvalidInput(format!("Invalid purchase body: {}", e)))?;

    Ok(body.count.unwrap_or(1))
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub tickets: Vec<Ticket>,
    pub total_paid: Decimal,
}

pub async fn purchase(
    State(state): State<Arc<AppState>>,
    SignedIn(session): SignedIn,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PurchaseResponse>> {
    let user_id = session.user_id;
    let count = purchase_count(&headers, &body)?;

    tracing::info!("User {} buying {} ticket(s) for raffle {}", user_id, count, id);

    let tickets = state
        .raffle_manager
        .purchase_tickets(id, user_id, count)
        .await?;
    let total_paid = tickets.iter().map(|t| t.price_paid).sum();

    Ok(Json(PurchaseResponse { tickets, total_paid }))
}
