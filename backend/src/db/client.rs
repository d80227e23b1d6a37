use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;

use crate::config::Config;
use crate::db::memory::MemoryBackend;
use crate::db::rest::RestBackend;
use crate::error::{Result, StorefrontError};
use crate::session::SessionHolder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Profiles,
    Raffles,
    Tickets,
    Transactions,
    Notifications,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Profiles => "profiles",
            Collection::Raffles => "raffles",
            Collection::Tickets => "tickets",
            Collection::Transactions => "transactions",
            Collection::Notifications => "notifications",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "profiles" => Some(Collection::Profiles),
            "raffles" => Some(Collection::Raffles),
            "tickets" => Some(Collection::Tickets),
            "transactions" => Some(Collection::Transactions),
            "notifications" => Some(Collection::Notifications),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One primitive call against the data service. Used as the unit for
/// request accounting and failure injection in the memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Select(Collection),
    Insert(Collection),
    Rpc(String),
}

#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub collection: Collection,
    pub columns: String,
    pub filters: Vec<(String, String)>,
    pub order: Option<(String, bool)>,
}

impl SelectQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), value.to_string()));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    /// Names of the relations embedded through `name(*)` in the column list.
    pub fn embedded(&self) -> Vec<String> {
        self.columns
            .split(',')
            .map(str::trim)
            .filter_map(|c| c.strip_suffix("(*)"))
            .map(str::to_string)
            .collect()
    }

    pub fn to_query_string(&self) -> String {
        let columns: String = self.columns.chars().filter(|c| !c.is_whitespace()).collect();
        let mut params = vec![format!("select={}", urlencoding::encode(&columns))];

        for (column, value) in &self.filters {
            params.push(format!(
                "{}=eq.{}",
                urlencoding::encode(column),
                urlencoding::encode(value)
            ));
        }

        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(format!("order={}.{}", urlencoding::encode(column), direction));
        }

        params.join("&")
    }
}

#[derive(Clone)]
pub enum DataBackend {
    Rest(RestBackend),
    Memory(MemoryBackend),
}

/// Handle to the remote data service. Cheap to clone.
#[derive(Clone)]
pub struct DataClient {
    backend: DataBackend,
}

impl DataClient {
    pub fn rest(config: &Config, session: SessionHolder) -> Result<Self> {
        Ok(Self {
            backend: DataBackend::Rest(RestBackend::new(config, session)?),
        })
    }

    pub fn memory(backend: MemoryBackend) -> Self {
        Self {
            backend: DataBackend::Memory(backend),
        }
    }

    pub async fn select<T: DeserializeOwned>(&self, query: &SelectQuery) -> Result<Vec<T>> {
        let rows = match &self.backend {
            DataBackend::Rest(backend) => backend.select(query).await?,
            DataBackend::Memory(backend) => backend.select(query)?,
        };

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(StorefrontError::from))
            .collect()
    }

    /// Zero or one row; more than one matching row is an error.
    pub async fn select_maybe_single<T: DeserializeOwned>(
        &self,
        query: &SelectQuery,
    ) -> Result<Option<T>> {
        let mut rows = self.select::<T>(query).await?;

        if rows.len() > 1 {
            return Err(StorefrontError::Backend {
                status: 406,
                code: Some("PGRST116".to_string()),
                message: format!(
                    "JSON object requested, multiple ({}) rows returned from {}",
                    rows.len(),
                    query.collection
                ),
            });
        }

        Ok(rows.pop())
    }

    /// Inserts one row and returns it as stored, server defaults included.
    pub async fn insert<B, T>(&self, collection: Collection, row: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(row)?;

        let stored = match &self.backend {
            DataBackend::Rest(backend) => backend.insert(collection, body).await?,
            DataBackend::Memory(backend) => backend.insert(collection, body)?,
        };

        Ok(serde_json::from_value(stored)?)
    }

    pub async fn rpc(&self, function: &str, args: Value) -> Result<()> {
        match &self.backend {
            DataBackend::Rest(backend) => backend.rpc(function, args).await,
            DataBackend::Memory(backend) => backend.rpc(function, args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string() {
        let query = SelectQuery::new(Collection::Tickets)
            .columns("*, raffles(*)")
            .eq("user_id", "2c8a2a0e-7f7e-4d6c-bd8e-2b8bb1f7c4d2")
            .order("purchase_date", false);

        assert_eq!(
            query.to_query_string(),
            "select=%2A%2Craffles%28%2A%29&user_id=eq.2c8a2a0e-7f7e-4d6c-bd8e-2b8bb1f7c4d2&order=purchase_date.desc"
        );
    }

    #[test]
    fn test_embedded_relations() {
        let query = SelectQuery::new(Collection::Tickets).columns("*, raffles(*)");
        assert_eq!(query.embedded(), vec!["raffles".to_string()]);

        let plain = SelectQuery::new(Collection::Raffles);
        assert!(plain.embedded().is_empty());
    }

    #[test]
    fn test_collection_names_round_trip() {
        for collection in [
            Collection::Profiles,
            Collection::Raffles,
            Collection::Tickets,
            Collection::Transactions,
            Collection::Notifications,
        ] {
            assert_eq!(Collection::from_name(collection.as_str()), Some(collection));
        }
        assert_eq!(Collection::from_name("wallets"), None);
    }
}
