//! Error types for transaction construction
//!
//! Construction errors are fatal for the request that hit them; nothing in
//! the builder retries.

use thiserror::Error;

use crate::address::AddressError;
use crate::ledger::NetworkError;

/// Error type for all transaction builder operations
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// XDR encoding or bounds failure
    #[error("XDR error: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),

    /// An address could not be decoded into ledger key material
    #[error("Invalid address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },

    /// The ledger client cannot simulate contract invocations
    #[error("Simulation unsupported by the configured network client")]
    SimulationUnsupported,

    /// Simulation ran and reported a failure, or its response was unusable
    #[error("Simulation failed: {0}")]
    SimulationFailed(String),

    /// Failed to sign the transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Fee arithmetic overflowed the transaction fee field
    #[error("Fee overflow: base fee {base_fee} x {operations} ops + resource fee {resource_fee}")]
    FeeOverflow {
        base_fee: u32,
        operations: usize,
        resource_fee: i64,
    },
}

impl TransactionBuilderError {
    pub(crate) fn invalid_address(address: &str, source: AddressError) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            source,
        }
    }

    /// Map a simulation call failure, keeping "unsupported" distinguishable
    pub(crate) fn from_simulation(err: NetworkError) -> Self {
        if err.is_unsupported() {
            Self::SimulationUnsupported
        } else {
            Self::SimulationFailed(err.to_string())
        }
    }

    pub fn is_simulation_unsupported(&self) -> bool {
        matches!(self, Self::SimulationUnsupported)
    }

    pub fn is_simulation_failure(&self) -> bool {
        matches!(self, Self::SimulationFailed(_))
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Xdr(_) => "xdr",
            Self::InvalidAddress { .. } => "address",
            Self::SimulationUnsupported => "simulation_unsupported",
            Self::SimulationFailed(_) => "simulation_failed",
            Self::Signing(_) => "signing",
            Self::FeeOverflow { .. } => "fee",
        }
    }
}
