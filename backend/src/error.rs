use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Backend error ({status}): {message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not signed in: {0}")]
    Unauthorized(String),

    #[error("Raffle closed: {0}")]
    RaffleClosed(String),

    #[error("Ticket purchase failed after {purchased} of {requested} tickets: {source}")]
    PartialPurchase {
        purchased: usize,
        requested: usize,
        #[source]
        source: Box<StorefrontError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl StorefrontError {
    fn status_code(&self) -> StatusCode {
        match self {
            StorefrontError::Backend { status, .. } => match *status {
                401 | 403 => StatusCode::FORBIDDEN,
                409 => StatusCode::CONFLICT,
                400 | 404 | 422 => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            StorefrontError::Network(_) => StatusCode::BAD_GATEWAY,
            StorefrontError::NotFound(_) => StatusCode::NOT_FOUND,
            StorefrontError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StorefrontError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            StorefrontError::RaffleClosed(_) => StatusCode::CONFLICT,
            StorefrontError::PartialPurchase { source, .. } => source.status_code(),
            StorefrontError::Config(_) | StorefrontError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let error_message = match &self {
            StorefrontError::Backend { .. } => {
                tracing::error!("Backend error: {}", self);
                "Data backend rejected the request"
            }
            StorefrontError::Network(_) => {
                tracing::error!("Network error: {}", self);
                "Data backend unreachable"
            }
            StorefrontError::NotFound(_) => {
                tracing::warn!("Not found: {}", self);
                "Not found"
            }
            StorefrontError::InvalidInput(_) => {
                tracing::warn!("Invalid input: {}", self);
                "Invalid input"
            }
            StorefrontError::Unauthorized(_) => {
                tracing::warn!("Unauthorized: {}", self);
                "Sign in required"
            }
            StorefrontError::RaffleClosed(_) => {
                tracing::warn!("Raffle closed: {}", self);
                "Raffle closed"
            }
            StorefrontError::PartialPurchase { .. } => {
                tracing::error!("Partial purchase: {}", self);
                "Ticket purchase failed"
            }
            StorefrontError::Config(_) => {
                tracing::error!("Configuration error: {}", self);
                "Configuration error"
            }
            StorefrontError::Internal(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal server error"
            }
        };

        let mut body = json!({
            "error": error_message,
            "details": self.to_string(),
        });

        // callers need the count to reconcile tickets that were already issued
        if let StorefrontError::PartialPurchase { purchased, requested, .. } = &self {
            body["purchased"] = json!(purchased);
            body["requested"] = json!(requested);
        }

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<reqwest::Error> for StorefrontError {
    fn from(error: reqwest::Error) -> Self {
        StorefrontError::Network(error.to_string())
    }
}

impl From<serde_json::Error> for StorefrontError {
    fn from(error: serde_json::Error) -> Self {
        StorefrontError::Internal(format!("Malformed payload: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
