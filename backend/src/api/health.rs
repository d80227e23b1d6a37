use axum::{
    Json,
    response::IntoResponse,
    extract::State,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "Raffle Storefront",
        "version": env!("CARGO_PKG_VERSION"),
        "signed_in": state.session.user_id().is_some(),
        "cached_queries": state.raffle_manager.cache().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
pub struct PublicConfigResponse {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub ticket_number_prefix: String,
    pub max_tickets_per_purchase: u32,
}

// the anon key is meant for browsers; row-level policies do the real gating
pub async fn public_config(State(state): State<Arc<AppState>>) -> Json<PublicConfigResponse> {
    let config = &state.config;

    Json(PublicConfigResponse {
        supabase_url: config.supabase_url.clone(),
        supabase_anon_key: config.supabase_anon_key.clone(),
        ticket_number_prefix: config.ticket_number_prefix.clone(),
        max_tickets_per_purchase: config.max_tickets_per_purchase,
    })
}
