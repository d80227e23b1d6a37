use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub wallet_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RaffleStatus {
    Active,
    Completed,
    Cancelled,
}

impl RaffleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaffleStatus::Active => "active",
            RaffleStatus::Completed => "completed",
            RaffleStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Raffle {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub prize_image_url: Option<String>,
    pub ticket_price: Decimal,
    pub max_tickets: i32,
    pub tickets_sold: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: RaffleStatus,
    pub prize_value: Decimal,
    pub winner_ticket_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub expired: bool,
}

impl Raffle {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date <= now
    }

    /// Share of tickets sold, 0..=100. The sold counter may lag behind real
    /// sales, so this is a display value only.
    pub fn progress_percent(&self) -> f64 {
        if self.max_tickets <= 0 {
            return 0.0;
        }
        (self.tickets_sold as f64 / self.max_tickets as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> TimeRemaining {
        let diff = self.end_date - now;
        if diff.num_seconds() <= 0 {
            return TimeRemaining {
                days: 0,
                hours: 0,
                minutes: 0,
                expired: true,
            };
        }

        TimeRemaining {
            days: diff.num_days(),
            hours: diff.num_hours() % 24,
            minutes: diff.num_minutes() % 60,
            expired: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub raffle_id: Uuid,
    pub user_id: Uuid,
    pub ticket_number: String,
    pub purchase_date: DateTime<Utc>,
    pub price_paid: Decimal,
    #[serde(default)]
    pub is_winner: bool,
    pub created_at: DateTime<Utc>,
}

/// Ticket row with its raffle embedded through the `raffles` relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketWithRaffle {
    #[serde(flatten)]
    pub ticket: Ticket,
    #[serde(rename = "raffles", default)]
    pub raffle: Option<Raffle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
    pub raffle_id: Uuid,
    pub user_id: Uuid,
    pub ticket_number: String,
    pub price_paid: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    TicketPurchase,
    WalletTopup,
    Refund,
    PrizeClaim,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub raffle_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub payment_provider: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub raffle_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    RaffleStart,
    RaffleEnd,
    WinnerAnnouncement,
    General,
}

// not read by any flow yet, kept so the collection has a typed row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
