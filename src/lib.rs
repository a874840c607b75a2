//! Friendbot - test network funding service
//!
//! Funds destination addresses from a shared funding account, spreading the
//! load over a pool of channel accounts ("minions") that each supply the
//! sequence numbers for their own transactions.
//!
//! ## Components
//!
//! - **ledger**: network client trait with Horizon and RPC backends
//! - **tx_builder**: operation construction, signing and funding strategy
//! - **minion**: per-channel-account funding workflow
//! - **bot**: round-robin dispatch over the minion pool
//! - **bootstrap**: batch creation of the minion pool at startup
//! - **server**: HTTP glue

pub mod address;
pub mod bootstrap;
pub mod bot;
pub mod config;
pub mod ledger;
pub mod metrics;
pub mod minion;
pub mod observability;
pub mod server;
pub mod test_utils;
pub mod tx_builder;
pub mod types;
pub mod wallet;

pub use bot::Bot;
pub use config::Config;
pub use ledger::{LedgerBackend, NetworkClient, NetworkError};
pub use minion::{FundError, Minion};
pub use types::{Destination, DestinationKind, TransactionResult};

#[cfg(test)]
mod tests;
