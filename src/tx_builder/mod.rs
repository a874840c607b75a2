//! Transaction construction
//!
//! Split into focused modules:
//! - **errors**: construction error taxonomy
//! - **operations**: create-account, payment and contract transfer ops
//! - **builder**: assembly, hashing, signing and envelope encoding
//! - **simulate**: dry runs for contract transfers
//! - **strategy**: picks and builds the funding transaction for a destination
//!
//! Nothing here retries or holds state; sequence numbers are owned by the
//! caller.

pub mod errors;
pub use errors::TransactionBuilderError;

pub mod builder;
pub mod operations;
pub mod simulate;
pub mod strategy;

pub use builder::{
    build_transaction, sign_transaction, transaction_hash, SignedTransaction, TxParams, Validity,
};
pub use strategy::{make_funding_tx, FundingKind, FundingTxParams};
