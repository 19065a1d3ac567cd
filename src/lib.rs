// src/lib.rs
pub mod aggregator;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod finnhub;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod valuator;

// Re-export commonly used items
pub use config::Config;
pub use db::DatabasePool;
pub use error::LedgerError;
pub use models::*;
pub use routes::{app_router, AppState};
