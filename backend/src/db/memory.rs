//! In-process stand-in for the remote data service.
//!
//! Rows live as JSON objects per collection. Supports the same primitives as
//! the REST backend (equality filters, single-column ordering, `name(*)`
//! embedding, inserts with server defaults, the `increment_tickets_sold`
//! procedure) plus failure injection and per-operation request counts, which
//! the test suite uses to observe exactly which remote calls were issued.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::client::{Collection, Operation, SelectQuery};
use crate::error::{Result, StorefrontError};

#[derive(Debug, Clone)]
struct FailureRule {
    remaining_successes: usize,
    status: u16,
    message: String,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<DashMap<Collection, Vec<Value>>>,
    unique: Arc<DashMap<Collection, Vec<String>>>,
    failures: Arc<DashMap<Operation, FailureRule>>,
    requests: Arc<DashMap<Operation, usize>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, collection: Collection, rows: Vec<Value>) {
        self.tables.entry(collection).or_default().extend(rows);
    }

    /// Loads a fixture document of the form `{"raffles": [...], "profiles": [...]}`.
    /// Missing server-side columns get the same defaults an insert would.
    pub fn load_fixtures(&self, document: &Value) -> Result<usize> {
        let Value::Object(collections) = document else {
            return Err(StorefrontError::InvalidInput(
                "Fixture document must be an object keyed by collection".to_string(),
            ));
        };

        let mut loaded = 0;
        for (name, rows) in collections {
            let collection = Collection::from_name(name).ok_or_else(|| {
                StorefrontError::InvalidInput(format!("Unknown collection in fixtures: {}", name))
            })?;
            let Value::Array(rows) = rows else {
                return Err(StorefrontError::InvalidInput(format!(
                    "Fixtures for {} must be an array",
                    name
                )));
            };

            let mut prepared = Vec::with_capacity(rows.len());
            for row in rows {
                let Value::Object(mut map) = row.clone() else {
                    return Err(StorefrontError::InvalidInput(format!(
                        "Fixture rows for {} must be objects",
                        name
                    )));
                };
                apply_defaults(collection, &mut map);
                prepared.push(Value::Object(map));
            }

            loaded += prepared.len();
            self.seed(collection, prepared);
        }

        Ok(loaded)
    }

    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        self.tables
            .get(&collection)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    pub fn unique_column(&self, collection: Collection, column: &str) {
        self.unique
            .entry(collection)
            .or_default()
            .push(column.to_string());
    }

    /// Lets the first `successes` calls of `operation` through, then fails
    /// every later one with the given status and message.
    pub fn fail_after(&self, operation: Operation, successes: usize, status: u16, message: &str) {
        self.failures.insert(
            operation,
            FailureRule {
                remaining_successes: successes,
                status,
                message: message.to_string(),
            },
        );
    }

    pub fn fail_always(&self, operation: Operation, status: u16, message: &str) {
        self.fail_after(operation, 0, status, message);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Calls issued for `operation`, failed ones included.
    pub fn request_count(&self, operation: &Operation) -> usize {
        self.requests.get(operation).map(|n| *n).unwrap_or(0)
    }

    fn record(&self, operation: Operation) -> Result<()> {
        *self.requests.entry(operation.clone()).or_insert(0) += 1;

        if let Some(mut rule) = self.failures.get_mut(&operation) {
            if rule.remaining_successes > 0 {
                rule.remaining_successes -= 1;
                return Ok(());
            }
            return Err(StorefrontError::Backend {
                status: rule.status,
                code: None,
                message: rule.message.clone(),
            });
        }

        Ok(())
    }

    pub fn select(&self, query: &SelectQuery) -> Result<Vec<Value>> {
        self.record(Operation::Select(query.collection))?;

        // cloned out so no shard lock is held while embedding other tables
        let mut rows: Vec<Value> = self
            .rows(query.collection)
            .into_iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|(column, expected)| matches_eq(row.get(column), expected))
            })
            .collect();

        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(column), b.get(column));
                if *ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        for relation in query.embedded() {
            let related = Collection::from_name(&relation).ok_or_else(|| StorefrontError::Backend {
                status: 400,
                code: Some("PGRST200".to_string()),
                message: format!("Could not find a relationship for '{}'", relation),
            })?;
            let related_rows = self.rows(related);
            let foreign_key = format!("{}_id", relation.trim_end_matches('s'));

            for row in rows.iter_mut() {
                let target = row
                    .get(&foreign_key)
                    .and_then(|id| related_rows.iter().find(|r| r.get("id") == Some(id)))
                    .cloned()
                    .unwrap_or(Value::Null);

                if let Value::Object(map) = row {
                    map.insert(relation.clone(), target);
                }
            }
        }

        Ok(rows)
    }

    pub fn insert(&self, collection: Collection, row: Value) -> Result<Value> {
        self.record(Operation::Insert(collection))?;

        let Value::Object(mut map) = row else {
            return Err(StorefrontError::Backend {
                status: 400,
                code: Some("PGRST102".to_string()),
                message: "Insert payload must be a JSON object".to_string(),
            });
        };
        apply_defaults(collection, &mut map);
        let row = Value::Object(map);

        let mut table = self.tables.entry(collection).or_default();

        if let Some(columns) = self.unique.get(&collection) {
            for column in columns.iter() {
                let value = row.get(column);
                if table.iter().any(|existing| existing.get(column) == value) {
                    return Err(StorefrontError::Backend {
                        status: 409,
                        code: Some("23505".to_string()),
                        message: format!(
                            "duplicate key value violates unique constraint \"{}_{}_key\"",
                            collection, column
                        ),
                    });
                }
            }
        }

        table.push(row.clone());
        Ok(row)
    }

    pub fn rpc(&self, function: &str, args: Value) -> Result<()> {
        self.record(Operation::Rpc(function.to_string()))?;

        match function {
            "increment_tickets_sold" => {
                let raffle_id = args.get("raffle_id").cloned().unwrap_or(Value::Null);

                if let Some(mut raffles) = self.tables.get_mut(&Collection::Raffles) {
                    for raffle in raffles.iter_mut() {
                        if raffle.get("id") == Some(&raffle_id) {
                            let sold = raffle.get("tickets_sold").and_then(Value::as_i64).unwrap_or(0);
                            raffle["tickets_sold"] = json!(sold + 1);
                            raffle["updated_at"] = json!(Utc::now().to_rfc3339());
                        }
                    }
                }
                Ok(())
            }
            _ => Err(StorefrontError::Backend {
                status: 404,
                code: Some("PGRST202".to_string()),
                message: format!("Could not find the function public.{}", function),
            }),
        }
    }
}

fn apply_defaults(collection: Collection, row: &mut Map<String, Value>) {
    let now = json!(Utc::now().to_rfc3339());
    let mut default = |key: &str, value: Value| {
        row.entry(key.to_string()).or_insert(value);
    };

    default("id", json!(Uuid::new_v4()));
    default("created_at", now.clone());

    match collection {
        Collection::Profiles => {
            default("phone", Value::Null);
            default("wallet_balance", json!(0));
            default("updated_at", now);
        }
        Collection::Raffles => {
            default("prize_image_url", Value::Null);
            default("tickets_sold", json!(0));
            default("status", json!("active"));
            default("winner_ticket_id", Value::Null);
            default("updated_at", now);
        }
        Collection::Tickets => {
            default("purchase_date", now);
            default("is_winner", json!(false));
        }
        Collection::Transactions => {
            default("raffle_id", Value::Null);
            default("ticket_id", Value::Null);
            default("status", json!("pending"));
            default("payment_provider", Value::Null);
            default("payment_reference", Value::Null);
            default("updated_at", now);
        }
        Collection::Notifications => {
            default("user_id", Value::Null);
            default("sent_at", Value::Null);
            default("read_at", Value::Null);
        }
    }
}

fn matches_eq(value: Option<&Value>, expected: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        _ => false,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            // timestamps differ in fractional-second width, so compare them as instants
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        // nulls sort last, as the data API does by default for ascending order
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_timestamp_with_mixed_precision() {
        let backend = MemoryBackend::new();
        backend.seed(
            Collection::Raffles,
            vec![
                json!({"id": "a", "status": "active", "end_date": "2026-11-01T00:00:00.5+00:00"}),
                json!({"id": "b", "status": "active", "end_date": "2026-11-01T00:00:00Z"}),
                json!({"id": "c", "status": "completed", "end_date": "2026-10-01T00:00:00Z"}),
            ],
        );

        let query = SelectQuery::new(Collection::Raffles)
            .eq("status", "active")
            .order("end_date", true);
        let rows = backend.select(&query).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();

        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_embed_joins_on_foreign_key() {
        let backend = MemoryBackend::new();
        backend.seed(Collection::Raffles, vec![json!({"id": "r1", "title": "Car"})]);
        backend.seed(
            Collection::Tickets,
            vec![
                json!({"id": "t1", "raffle_id": "r1", "user_id": "u1"}),
                json!({"id": "t2", "raffle_id": "gone", "user_id": "u1"}),
            ],
        );

        let query = SelectQuery::new(Collection::Tickets)
            .columns("*, raffles(*)")
            .eq("user_id", "u1");
        let rows = backend.select(&query).unwrap();

        assert_eq!(rows[0]["raffles"]["title"], "Car");
        assert!(rows[1]["raffles"].is_null());
    }

    #[test]
    fn test_insert_applies_defaults() {
        let backend = MemoryBackend::new();
        let row = backend
            .insert(
                Collection::Tickets,
                json!({"raffle_id": "r1", "user_id": "u1", "ticket_number": "TT-2026-000001", "price_paid": "10"}),
            )
            .unwrap();

        assert!(row["id"].is_string());
        assert_eq!(row["is_winner"], false);
        assert!(row["purchase_date"].is_string());
        assert_eq!(backend.rows(Collection::Tickets).len(), 1);
    }

    #[test]
    fn test_unique_column_rejects_duplicates() {
        let backend = MemoryBackend::new();
        backend.unique_column(Collection::Tickets, "ticket_number");

        backend
            .insert(Collection::Tickets, json!({"ticket_number": "TT-2026-000001"}))
            .unwrap();
        let err = backend
            .insert(Collection::Tickets, json!({"ticket_number": "TT-2026-000001"}))
            .unwrap_err();

        assert!(matches!(err, StorefrontError::Backend { status: 409, .. }));
        assert_eq!(backend.rows(Collection::Tickets).len(), 1);
    }

    #[test]
    fn test_load_fixtures_applies_defaults() {
        let backend = MemoryBackend::new();
        let loaded = backend
            .load_fixtures(&json!({
                "raffles": [{"title": "Bike", "end_date": "2026-12-01T00:00:00Z"}],
                "profiles": [{"full_name": "Ana"}, {"full_name": "Ben"}]
            }))
            .unwrap();

        assert_eq!(loaded, 3);
        let raffles = backend.rows(Collection::Raffles);
        assert_eq!(raffles[0]["status"], "active");
        assert_eq!(raffles[0]["tickets_sold"], 0);
        assert!(raffles[0]["id"].is_string());
        assert_eq!(backend.rows(Collection::Profiles).len(), 2);
    }

    #[test]
    fn test_load_fixtures_rejects_unknown_collection() {
        let backend = MemoryBackend::new();
        assert!(backend.load_fixtures(&json!({"orders": []})).is_err());
        assert!(backend.load_fixtures(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_fail_after_counts_successes() {
        let backend = MemoryBackend::new();
        let op = Operation::Insert(Collection::Transactions);
        backend.fail_after(op.clone(), 1, 500, "boom");

        assert!(backend.insert(Collection::Transactions, json!({})).is_ok());
        assert!(backend.insert(Collection::Transactions, json!({})).is_err());
        assert!(backend.insert(Collection::Transactions, json!({})).is_err());
        assert_eq!(backend.request_count(&op), 3);
        assert_eq!(backend.rows(Collection::Transactions).len(), 1);
    }

    #[test]
    fn test_increment_tickets_sold() {
        let backend = MemoryBackend::new();
        backend.seed(Collection::Raffles, vec![json!({"id": "r1", "tickets_sold": 4})]);

        backend
            .rpc("increment_tickets_sold", json!({"raffle_id": "r1"}))
            .unwrap();
        assert_eq!(backend.rows(Collection::Raffles)[0]["tickets_sold"], 5);

        assert!(backend.rpc("draw_winner", json!({})).is_err());
    }
}
