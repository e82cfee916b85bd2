pub mod auth;
pub mod client;
pub mod models;

pub use client::PersistenceClient;
pub use models::*;
