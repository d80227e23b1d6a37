use reqwest::{header, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::db::client::{Collection, SelectQuery};
use crate::error::{Result, StorefrontError};
use crate::session::SessionHolder;

/// Error body returned by the REST data API.
#[derive(Debug, Deserialize)]
struct RestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

#[derive(Clone)]
pub struct RestBackend {
    http: reqwest::Client,
    rest_url: String,
    anon_key: String,
    session: SessionHolder,
}

impl RestBackend {
    pub fn new(config: &Config, session: SessionHolder) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| StorefrontError::Config(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!("Data API URL: {}/rest/v1", config.supabase_url);

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
            session,
        })
    }

    // row-level policies see the signed-in user only when their token is sent;
    // the anon key stands in for anonymous reads
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .session
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());

        request
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
    }

    pub async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>> {
        let url = format!(
            "{}/{}?{}",
            self.rest_url,
            query.collection,
            query.to_query_string()
        );
        tracing::debug!("GET {}", url);

        let response = self
            .authorize(self.http.get(&url))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let rows = check(response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    pub async fn insert(&self, collection: Collection, row: Value) -> Result<Value> {
        let url = format!("{}/{}", self.rest_url, collection);
        tracing::debug!("POST {}", url);

        let response = self
            .authorize(self.http.post(&url))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;

        let mut rows = check(response).await?.json::<Vec<Value>>().await?;

        if rows.len() != 1 {
            return Err(StorefrontError::Backend {
                status: 406,
                code: Some("PGRST116".to_string()),
                message: format!(
                    "Insert into {} returned {} rows, expected exactly one",
                    collection,
                    rows.len()
                ),
            });
        }

        Ok(rows.remove(0))
    }

    pub async fn rpc(&self, function: &str, args: Value) -> Result<()> {
        let url = format!("{}/rpc/{}", self.rest_url, function);
        tracing::debug!("POST {}", url);

        let response = self
            .authorize(self.http.post(&url))
            .json(&args)
            .send()
            .await?;

        // void functions answer 204 or a literal null; nothing to read either way
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status.as_u16(), &body))
}

fn error_from_body(status: u16, body: &str) -> StorefrontError {
    match serde_json::from_str::<RestErrorBody>(body) {
        Ok(parsed) => {
            let mut message = parsed.message.unwrap_or_else(|| body.to_string());
            if let Some(details) = parsed.details.filter(|d| !d.is_empty()) {
                message = format!("{} ({})", message, details);
            }
            if let Some(hint) = parsed.hint.filter(|h| !h.is_empty()) {
                tracing::debug!("Data API hint: {}", hint);
            }

            StorefrontError::Backend {
                status,
                code: parsed.code,
                message,
            }
        }
        Err(_) => StorefrontError::Backend {
            status,
            code: None,
            message: if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body.to_string()
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_with_details() {
        let body = r#"{"code":"23505","details":"Key (ticket_number)=(TT-2026-000001) already exists.","hint":null,"message":"duplicate key value violates unique constraint \"tickets_ticket_number_key\""}"#;

        match error_from_body(409, body) {
            StorefrontError::Backend { status, code, message } => {
                assert_eq!(status, 409);
                assert_eq!(code.as_deref(), Some("23505"));
                assert!(message.starts_with("duplicate key value"));
                assert!(message.contains("TT-2026-000001"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_body_not_json() {
        match error_from_body(503, "") {
            StorefrontError::Backend { status, code, message } => {
                assert_eq!(status, 503);
                assert!(code.is_none());
                assert_eq!(message, "HTTP 503");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
