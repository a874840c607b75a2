//! Ledger client abstraction
//!
//! Two backends with different timing models sit behind one trait:
//! - **horizon**: synchronous submission, returns once the ledger applies or
//!   rejects the transaction
//! - **rpc**: asynchronous submission, polled with bounded exponential backoff
//!   until a terminal state or the deadline
//!
//! Both expose the same [`NetworkError`] taxonomy so callers never look at
//! backend-specific error shapes.

use async_trait::async_trait;
use stellar_xdr::curr::{ScVal, SorobanAuthorizationEntry, SorobanTransactionData};

pub mod horizon;
pub mod ledger_errors;
pub mod poll;
pub mod rpc;

pub use horizon::HorizonClient;
pub use ledger_errors::{NetworkError, NetworkErrorKind, CREATE_ACCOUNT_ALREADY_EXIST_XDR};
pub use poll::PollConfig;
pub use rpc::RpcClient;

/// The minimal account state funding needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDetails {
    /// Current sequence number
    pub sequence: i64,
    /// Native balance in stroops
    pub balance: i64,
}

/// Resource data returned by simulating a contract invocation
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    /// Minimum resource fee in stroops
    pub min_resource_fee: i64,
    pub transaction_data: SorobanTransactionData,
    pub auth: Vec<SorobanAuthorizationEntry>,
    /// Return value of the simulated call, when reported
    pub result: Option<ScVal>,
}

/// General interface for interacting with ledger network services
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Submit a signed envelope and block until it can return a result
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<(), NetworkError>;

    /// Sequence and native balance of `account_id`
    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails, NetworkError>;

    /// Dry-run a contract-invoking envelope. Backends without the capability
    /// return an error classified [`NetworkErrorKind::Unsupported`].
    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulationResult, NetworkError>;
}

#[async_trait]
impl<T: NetworkClient + ?Sized> NetworkClient for std::sync::Arc<T> {
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<(), NetworkError> {
        (**self).submit_transaction(envelope_xdr).await
    }

    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails, NetworkError> {
        (**self).get_account_details(account_id).await
    }

    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulationResult, NetworkError> {
        (**self).simulate_transaction(envelope_xdr).await
    }
}

/// Backend selected at startup
#[derive(Debug, Clone)]
pub enum LedgerBackend {
    Horizon(HorizonClient),
    Rpc(RpcClient),
}

impl LedgerBackend {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerBackend::Horizon(_) => "horizon",
            LedgerBackend::Rpc(_) => "rpc",
        }
    }
}

#[async_trait]
impl NetworkClient for LedgerBackend {
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<(), NetworkError> {
        match self {
            LedgerBackend::Horizon(c) => c.submit_transaction(envelope_xdr).await,
            LedgerBackend::Rpc(c) => c.submit_transaction(envelope_xdr).await,
        }
    }

    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails, NetworkError> {
        match self {
            LedgerBackend::Horizon(c) => c.get_account_details(account_id).await,
            LedgerBackend::Rpc(c) => c.get_account_details(account_id).await,
        }
    }

    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulationResult, NetworkError> {
        match self {
            LedgerBackend::Horizon(c) => c.simulate_transaction(envelope_xdr).await,
            LedgerBackend::Rpc(c) => c.simulate_transaction(envelope_xdr).await,
        }
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::timeout(format!("request timed out: {err}"))
    } else {
        NetworkError::other(format!("transport error: {err}"))
    }
}
