use chrono::{Datelike, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Mutex;
use uuid::Uuid;

use crate::cache::{Query, QueryCache, QueryKey};
use crate::config::Config;
use crate::db::models::{
    NewTicket, NewTransaction, Profile, Raffle, RaffleStatus, Ticket, TicketWithRaffle,
    TransactionRecord, TransactionStatus, TransactionType,
};
use crate::db::{Collection, DataClient, SelectQuery};
use crate::error::{Result, StorefrontError};
use crate::raffle::ticket_number;

pub const INCREMENT_TICKETS_SOLD: &str = "increment_tickets_sold";

pub mod keys {
    use super::*;

    pub fn active_raffles() -> QueryKey {
        QueryKey::new(["raffles"])
    }

    pub fn raffle(id: Uuid) -> QueryKey {
        QueryKey::new(["raffle".to_string(), id.to_string()])
    }

    pub fn all_tickets() -> QueryKey {
        QueryKey::new(["tickets"])
    }

    pub fn user_tickets(user_id: Uuid) -> QueryKey {
        QueryKey::new(["tickets".to_string(), user_id.to_string()])
    }

    pub fn all_profiles() -> QueryKey {
        QueryKey::new(["profile"])
    }

    pub fn profile(user_id: Uuid) -> QueryKey {
        QueryKey::new(["profile".to_string(), user_id.to_string()])
    }
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub max_tickets_per_purchase: u32,
    pub ticket_number_prefix: String,
    /// Makes the ticket number sequence reproducible.
    pub ticket_number_seed: Option<u64>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_tickets_per_purchase: 10,
            ticket_number_prefix: "TT".to_string(),
            ticket_number_seed: None,
        }
    }
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_tickets_per_purchase: config.max_tickets_per_purchase,
            ticket_number_prefix: config.ticket_number_prefix.clone(),
            ticket_number_seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub raffle_id: Uuid,
    pub user_id: Uuid,
    // taken from the raffle when the purchase starts; the backend does not re-check it
    pub ticket_price: Decimal,
    pub ticket_number: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TicketSummary {
    pub total: usize,
    pub in_active_raffles: usize,
    pub won: usize,
}

pub struct RaffleManager {
    data: DataClient,
    cache: QueryCache,
    settings: ManagerSettings,
    seeded_numbers: Option<Mutex<StdRng>>,
}

impl RaffleManager {
    pub fn new(data: DataClient, cache: QueryCache, settings: ManagerSettings) -> Self {
        let seeded_numbers = settings
            .ticket_number_seed
            .map(|seed| Mutex::new(StdRng::seed_from_u64(seed)));

        Self {
            data,
            cache,
            settings,
            seeded_numbers,
        }
    }

    fn next_ticket_number(&self) -> String {
        let prefix = &self.settings.ticket_number_prefix;

        match &self.seeded_numbers {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                ticket_number::generate_with(prefix, Utc::now().year(), &mut *rng)
            }
            None => ticket_number::generate(prefix),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Active raffles, soonest to close first.
    pub async fn active_raffles(&self) -> Result<Vec<Raffle>> {
        self.cache
            .fetch(keys::active_raffles(), || async move {
                let query = SelectQuery::new(Collection::Raffles)
                    .eq("status", RaffleStatus::Active.as_str())
                    .order("end_date", true);
                self.data.select::<Raffle>(&query).await
            })
            .await
    }

    pub async fn raffle(&self, raffle_id: Uuid) -> Result<Option<Raffle>> {
        self.cache
            .fetch(keys::raffle(raffle_id), || async move {
                let query = SelectQuery::new(Collection::Raffles).eq("id", raffle_id);
                self.data.select_maybe_single::<Raffle>(&query).await
            })
            .await
    }

    /// Tickets of `user_id` with their raffles, newest first. Idle without a user.
    pub async fn user_tickets(&self, user_id: Option<Uuid>) -> Result<Query<Vec<TicketWithRaffle>>> {
        let Some(user_id) = user_id else {
            return Ok(Query::Idle);
        };

        let tickets = self
            .cache
            .fetch(keys::user_tickets(user_id), || async move {
                let query = SelectQuery::new(Collection::Tickets)
                    .columns("*, raffles(*)")
                    .eq("user_id", user_id)
                    .order("purchase_date", false);
                self.data.select::<TicketWithRaffle>(&query).await
            })
            .await?;

        Ok(Query::Ready(tickets))
    }

    pub async fn profile(&self, user_id: Option<Uuid>) -> Result<Query<Option<Profile>>> {
        let Some(user_id) = user_id else {
            return Ok(Query::Idle);
        };

        let profile = self
            .cache
            .fetch(keys::profile(user_id), || async move {
                let query = SelectQuery::new(Collection::Profiles).eq("id", user_id);
                self.data.select_maybe_single::<Profile>(&query).await
            })
            .await?;

        Ok(Query::Ready(profile))
    }

    pub async fn ticket_summary(&self, user_id: Uuid) -> Result<TicketSummary> {
        let tickets = self.user_tickets(Some(user_id)).await?.ready().unwrap_or_default();

        Ok(TicketSummary {
            total: tickets.len(),
            in_active_raffles: tickets
                .iter()
                .filter(|t| matches!(&t.raffle, Some(r) if r.status == RaffleStatus::Active))
                .count(),
            won: tickets.iter().filter(|t| t.ticket.is_winner).count(),
        })
    }

    /// Buys one ticket: ticket row, then its transaction row, then a
    /// best-effort bump of the raffle's sold counter.
    ///
    /// A failed transaction insert leaves the ticket row in place; nothing is
    /// rolled back. A failed counter bump is logged and ignored.
    pub async fn purchase_ticket(&self, request: PurchaseRequest) -> Result<Ticket> {
        let ticket: Ticket = self
            .data
            .insert(
                Collection::Tickets,
                &NewTicket {
                    raffle_id: request.raffle_id,
                    user_id: request.user_id,
                    ticket_number: request.ticket_number.clone(),
                    price_paid: request.ticket_price,
                },
            )
            .await?;

        tracing::debug!(
            "Ticket {} ({}) created for raffle {}",
            ticket.ticket_number,
            ticket.id,
            ticket.raffle_id
        );

        let transaction: TransactionRecord = self
            .data
            .insert(
                Collection::Transactions,
                &NewTransaction {
                    user_id: request.user_id,
                    raffle_id: Some(request.raffle_id),
                    ticket_id: Some(ticket.id),
                    transaction_type: TransactionType::TicketPurchase,
                    amount: request.ticket_price,
                    status: TransactionStatus::Completed,
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    "Transaction insert failed after ticket {} was created: {}",
                    ticket.id,
                    e
                );
                e
            })?;

        tracing::debug!("Transaction {} recorded for ticket {}", transaction.id, ticket.id);

        if let Err(e) = self
            .data
            .rpc(INCREMENT_TICKETS_SOLD, json!({ "raffle_id": request.raffle_id }))
            .await
        {
            tracing::error!(
                "Failed to increment tickets_sold for raffle {}: {}",
                request.raffle_id,
                e
            );
        }

        self.cache.invalidate(&keys::active_raffles());
        self.cache.invalidate(&keys::raffle(request.raffle_id));
        self.cache.invalidate(&keys::user_tickets(request.user_id));

        tracing::info!(
            "User {} bought ticket {} for raffle {}",
            request.user_id,
            ticket.ticket_number,
            request.raffle_id
        );

        Ok(ticket)
    }

    /// Buys `count` tickets one after another at the raffle's current price.
    ///
    /// The first failing purchase stops the loop. Tickets bought before it
    /// stay bought, and the error says how many there were.
    pub async fn purchase_tickets(
        &self,
        raffle_id: Uuid,
        user_id: Uuid,
        count: u32,
    ) -> Result<Vec<Ticket>> {
        if count == 0 || count > self.settings.max_tickets_per_purchase {
            return Err(StorefrontError::InvalidInput(format!(
                "Ticket count must be between 1 and {}",
                self.settings.max_tickets_per_purchase
            )));
        }

        let raffle = self
            .raffle(raffle_id)
            .await?
            .ok_or_else(|| StorefrontError::NotFound(format!("Raffle {}", raffle_id)))?;

        if raffle.is_expired(Utc::now()) {
            return Err(StorefrontError::RaffleClosed(format!(
                "Raffle {} ended at {}",
                raffle.id, raffle.end_date
            )));
        }

        let requested = count as usize;
        let mut tickets = Vec::with_capacity(requested);

        for _ in 0..count {
            let request = PurchaseRequest {
                raffle_id,
                user_id,
                ticket_price: raffle.ticket_price,
                ticket_number: self.next_ticket_number(),
            };

            match self.purchase_ticket(request).await {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => {
                    tracing::error!(
                        "Purchase for raffle {} stopped after {} of {} tickets: {}",
                        raffle_id,
                        tickets.len(),
                        requested,
                        e
                    );
                    return Err(StorefrontError::PartialPurchase {
                        purchased: tickets.len(),
                        requested,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(tickets)
    }
}
