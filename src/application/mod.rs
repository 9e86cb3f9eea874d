//! Application layer orchestrating the local ledger cache.
//!
//! `TransferCoordinator` drives fund movements against the remote authority
//! and mirrors them locally; `ReconciliationEngine` merges authoritative
//! snapshots back into the cache; `RecencyGuard` keeps the two from fighting
//! over freshly written balances.

pub mod coordinator;
pub mod recency;
pub mod reconcile;
