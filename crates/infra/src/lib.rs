//! Infrastructure layer: storage backends, configuration, and the stock engine.

pub mod config;
pub mod engine;
pub mod locks;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{Backend, ConfigError, DatabaseConfig, LedgerConfig};
pub use engine::StockEngine;
pub use locks::{ProductLocks, ProductScope};
pub use store::{ConfiguredStore, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
