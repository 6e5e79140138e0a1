//! Storage module for database and configuration.

pub mod config;
pub mod database;
pub mod schema;
pub mod squad_store;

pub use config::{AppConfig, CloseoutSettings, ConfigError, DatabaseSettings};
pub use database::{Database, DatabaseError};
pub use squad_store::SquadStore;
