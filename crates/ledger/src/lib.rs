//! Movement ledger module.
//!
//! This crate contains the ledger's deterministic rules: movement validation,
//! the balance fold over a product's history, the withdrawal guard, history
//! ordering and stock snapshots. Atomicity and storage live in
//! `stockledger-infra`.

pub mod balance;
pub mod movement;
pub mod snapshot;

pub use balance::{BalanceAudit, balance_after, check_withdrawal, derive_balance};
pub use movement::{AppendMovement, Movement, MovementDraft, MovementKind, newest_first};
pub use snapshot::{SnapshotFilter, StockSnapshot, sort_snapshots};
