//! Domain entities, value objects and the ports the application layer
//! depends on.

pub mod account;
pub mod money;
pub mod ports;
pub mod transaction;
