use std::env;

/// Where rows come from: the remote REST data API, or an in-process store
/// for local runs without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBackendKind {
    Rest,
    Memory,
}

impl std::str::FromStr for DataBackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(DataBackendKind::Rest),
            "memory" => Ok(DataBackendKind::Memory),
            other => anyhow::bail!("DATA_BACKEND must be \"rest\" or \"memory\", got {:?}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub request_timeout_seconds: u64,
    pub query_retry_attempts: u32,
    pub max_tickets_per_purchase: u32,
    pub ticket_number_prefix: String,
    /// `None` allows any origin; requests still need the session's bearer token.
    pub cors_allowed_origin: Option<String>,
    pub query_cache_max_entries: usize,
    pub query_cache_max_age_seconds: u64,
    pub data_backend: DataBackendKind,
    pub memory_seed_path: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // treating empty values as unset because docker-compose passes "" for missing vars
        let mut lookup = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        // fallback to loading backend/.env explicitly in case working directory isn't set correctly
        if lookup("SUPABASE_URL").is_none() {
            let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
            let _ = dotenvy::from_path_override(&env_path);
        }

        Self::from_lookup(&mut lookup)
    }

    pub fn from_lookup<F>(lookup: &mut F) -> anyhow::Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let data_backend: DataBackendKind = lookup("DATA_BACKEND")
            .unwrap_or_else(|| "rest".to_string())
            .parse()?;

        // the in-memory backend never talks to the data API, so it needs no credentials
        let (supabase_url, supabase_anon_key) = match data_backend {
            DataBackendKind::Rest => (
                lookup("SUPABASE_URL").ok_or_else(|| anyhow::anyhow!("SUPABASE_URL is not set"))?,
                lookup("SUPABASE_ANON_KEY")
                    .ok_or_else(|| anyhow::anyhow!("SUPABASE_ANON_KEY is not set"))?,
            ),
            DataBackendKind::Memory => (
                lookup("SUPABASE_URL").unwrap_or_default(),
                lookup("SUPABASE_ANON_KEY").unwrap_or_default(),
            ),
        };

        let max_tickets_per_purchase: u32 = lookup("MAX_TICKETS_PER_PURCHASE")
            .unwrap_or_else(|| "10".to_string())
            .parse()?;
        if max_tickets_per_purchase == 0 {
            anyhow::bail!("MAX_TICKETS_PER_PURCHASE must be at least 1");
        }

        let cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN").map(|o| o.trim_end_matches('/').to_string());
        if let Some(origin) = &cors_allowed_origin {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                anyhow::bail!("CORS_ALLOWED_ORIGIN must be an http(s) origin, got {}", origin);
            }
        }

        let query_cache_max_entries: usize = lookup("QUERY_CACHE_MAX_ENTRIES")
            .unwrap_or_else(|| "1000".to_string())
            .parse()?;
        if query_cache_max_entries == 0 {
            anyhow::bail!("QUERY_CACHE_MAX_ENTRIES must be at least 1");
        }

        Ok(Config {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()?,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            request_timeout_seconds: lookup("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|| "30".to_string())
                .parse()?,
            query_retry_attempts: lookup("QUERY_RETRY_ATTEMPTS")
                .unwrap_or_else(|| "1".to_string())
                .parse()?,
            max_tickets_per_purchase,
            ticket_number_prefix: lookup("TICKET_NUMBER_PREFIX")
                .unwrap_or_else(|| "TT".to_string()),
            cors_allowed_origin,
            query_cache_max_entries,
            query_cache_max_age_seconds: lookup("QUERY_CACHE_MAX_AGE_SECONDS")
                .unwrap_or_else(|| "300".to_string())
                .parse()?,
            data_backend,
            memory_seed_path: lookup("MEMORY_SEED_PATH"),
        })
    }
}
