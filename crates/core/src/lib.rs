//! `stockledger-core`: shared building blocks for the stock ledger.
//!
//! This crate contains **pure domain** primitives (no storage, no IO).

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use id::{MovementId, ProductId};
