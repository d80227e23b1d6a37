pub mod manager;
pub mod ticket_number;

pub use manager::{ManagerSettings, PurchaseRequest, RaffleManager, TicketSummary};
