use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod raffle;
pub mod session;
pub mod ws;

use cache::QueryCache;
use config::Config;
use raffle::RaffleManager;
use raffle::manager::keys;
use session::SessionHolder;

#[derive(Clone)]
pub struct AppState {
    pub raffle_manager: Arc<RaffleManager>,
    pub session: SessionHolder,
    pub config: Arc<Config>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health::health_check))
        .route("/config/public", get(api::health::public_config))

        .route("/raffles", get(api::raffles::list_active))
        .route("/raffles/:id", get(api::raffles::get_raffle))
        .route("/raffles/:id/purchase", post(api::raffles::purchase))

        .route("/me/tickets", get(api::tickets::my_tickets))
        .route("/me/tickets/summary", get(api::tickets::my_ticket_summary))
        .route("/me/profile", get(api::tickets::my_profile))
        .route("/users/:user_id/tickets", get(api::tickets::user_tickets))
        .route("/profiles/:user_id", get(api::tickets::get_profile))

        .route(
            "/session",
            get(api::session::current)
                .post(api::session::sign_in)
                .delete(api::session::sign_out),
        )

        .route("/ws", get(ws::handler::ws_handler))

        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let Some(origin) = &config.cors_allowed_origin else {
        return CorsLayer::permissive();
    };

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin]))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        Err(e) => {
            // no allow-origin header at all means browsers refuse every cross-origin call
            tracing::warn!("Ignoring unusable CORS origin {}: {}", origin, e);
            CorsLayer::new()
        }
    }
}

/// Drops user-scoped cache entries whenever the session changes, so a new
/// user never sees the previous user's tickets or profile.
pub fn spawn_session_watcher(session: &SessionHolder, cache: QueryCache) -> tokio::task::JoinHandle<()> {
    let mut rx = session.subscribe();

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let user = rx.borrow_and_update().as_ref().map(|s| s.user_id);
            tracing::debug!("Session changed (user: {:?}), dropping user-scoped queries", user);

            cache.invalidate(&keys::all_tickets());
            cache.invalidate(&keys::all_profiles());
        }
    })
}
