pub mod auth;
pub mod health;
pub mod raffles;
pub mod session;
pub mod tickets;
