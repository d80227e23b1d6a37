pub mod client;
pub mod memory;
pub mod models;
pub mod rest;

pub use client::{Collection, DataClient, Operation, SelectQuery};
pub use memory::MemoryBackend;
