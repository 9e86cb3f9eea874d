//! Local ledger cache and reconciliation engine.
//!
//! Mirrors a remote banking authority into a local store, executes transfers
//! and deposits against the authority, and reconciles the cache with
//! authoritative snapshots while tolerating surrogate-id drift.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
