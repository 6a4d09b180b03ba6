//! Configuration loading and representation.

use std::env;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Which `LedgerStore` backend to open.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Backend {
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub backend: Backend,
    /// Present iff `backend == Backend::Postgres`.
    pub database: Option<DatabaseConfig>,
    /// Keep log-derived running totals next to the log (in-memory backend).
    pub cache_balances: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::InMemory,
            database: None,
            cache_balances: true,
        }
    }
}

impl LedgerConfig {
    /// Read settings from the process environment.
    ///
    /// - `STOCKLEDGER_BACKEND`: `memory` (default) or `postgres`
    /// - `DATABASE_URL`: required for `postgres`
    /// - `DB_MAX_CONNECTIONS`: default 10
    /// - `STOCKLEDGER_CACHE_BALANCES`: `true` (default) or `false`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("STOCKLEDGER_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("memory") => Backend::InMemory,
            Some("postgres") => Backend::Postgres,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STOCKLEDGER_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let database = match backend {
            Backend::InMemory => None,
            Backend::Postgres => {
                let url = lookup("DATABASE_URL")
                    .filter(|u| !u.trim().is_empty())
                    .ok_or(ConfigError::Missing("DATABASE_URL"))?;
                let max_connections = parse_or("DB_MAX_CONNECTIONS", lookup("DB_MAX_CONNECTIONS"), 10)?;
                Some(DatabaseConfig {
                    url,
                    max_connections,
                })
            }
        };

        let cache_balances = parse_or(
            "STOCKLEDGER_CACHE_BALANCES",
            lookup("STOCKLEDGER_CACHE_BALANCES"),
            true,
        )?;

        Ok(Self {
            backend,
            database,
            cache_balances,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
