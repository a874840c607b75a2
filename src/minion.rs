//! Funding worker
//!
//! A minion owns one channel account. The channel account supplies only the
//! sequence number of each funding transaction; the shared funder supplies
//! the value. The cached sequence is advanced optimistically before every
//! submission and is not guarded by a lock: two requests landing on the same
//! minion at once can build with the same sequence, in which case the ledger
//! rejects one with a bad sequence and the minion refreshes from the ledger
//! on its next run.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::ledger::{NetworkClient, NetworkError, NetworkErrorKind};
use crate::metrics::{metrics, Timer};
use crate::tx_builder::{
    make_funding_tx, FundingKind, FundingTxParams, SignedTransaction, TransactionBuilderError,
};
use crate::types::{format_amount, Destination, TransactionResult};
use crate::wallet::Keypair;

/// Why a funding request failed
#[derive(Debug, Error)]
pub enum FundError {
    #[error("account already funded to starting balance")]
    AlreadyFunded,

    /// A concurrent request created the destination between lookup and submit
    #[error("account already exists: transaction {hash} lost a create race")]
    AccountExists {
        hash: String,
        #[source]
        source: NetworkError,
    },

    #[error("checking minion seq: {0}")]
    SequenceRefresh(#[source] NetworkError),

    #[error("checking account exists: {0}")]
    AccountCheck(#[source] NetworkError),

    #[error("submitting tx {hash}: {source}")]
    Submission {
        hash: String,
        #[source]
        source: NetworkError,
    },

    #[error("contract funding requires simulation, which the network client does not support")]
    SimulationUnsupported,

    #[error("simulating contract transfer: {0}")]
    SimulationFailed(String),

    #[error("making payment tx: {0}")]
    Build(#[source] TransactionBuilderError),

    #[error("invalid destination address: {0}")]
    InvalidAddress(#[from] crate::address::AddressError),

    #[error("minion task ended without reporting a result")]
    WorkerLost,
}

impl From<TransactionBuilderError> for FundError {
    fn from(err: TransactionBuilderError) -> Self {
        match err {
            TransactionBuilderError::SimulationUnsupported => FundError::SimulationUnsupported,
            TransactionBuilderError::SimulationFailed(msg) => FundError::SimulationFailed(msg),
            other => FundError::Build(other),
        }
    }
}

impl FundError {
    /// Ledger classification of the underlying network failure, if any
    pub fn network_kind(&self) -> Option<NetworkErrorKind> {
        match self {
            FundError::SequenceRefresh(e)
            | FundError::AccountCheck(e)
            | FundError::AccountExists { source: e, .. }
            | FundError::Submission { source: e, .. } => Some(e.kind()),
            _ => None,
        }
    }

    pub fn is_bad_sequence(&self) -> bool {
        self.network_kind() == Some(NetworkErrorKind::BadSequence)
    }

    pub fn is_timeout(&self) -> bool {
        self.network_kind() == Some(NetworkErrorKind::Timeout)
    }

    /// Failures caused by the request itself rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, FundError::AlreadyFunded | FundError::InvalidAddress(_))
    }

    /// Label used for the outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            FundError::AlreadyFunded => "already_funded",
            FundError::AccountExists { .. } => "account_exists",
            FundError::SimulationUnsupported => "simulation_unsupported",
            FundError::SimulationFailed(_) => "simulation_failed",
            FundError::Build(_) => "build_error",
            FundError::InvalidAddress(_) => "invalid_address",
            FundError::WorkerLost => "worker_lost",
            FundError::SequenceRefresh(e)
            | FundError::AccountCheck(e)
            | FundError::Submission { source: e, .. } => e.kind().as_str(),
        }
    }
}

/// Settings shared read-only by every minion
#[derive(Debug)]
pub struct FundingContext {
    /// Account whose balance backs every transfer
    pub funder: Keypair,
    pub network_passphrase: String,
    /// Amount sent to each destination, in stroops
    pub starting_balance: i64,
    /// Per-operation inclusion fee, in stroops
    pub base_fee: u32,
}

/// A channel account and its locally tracked sequence number
#[derive(Debug)]
pub struct ChannelAccount {
    keypair: Keypair,
    /// Last known sequence; 0 means not fetched yet
    sequence: AtomicI64,
    force_refresh: AtomicBool,
}

impl ChannelAccount {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            sequence: AtomicI64::new(0),
            force_refresh: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        self.keypair.address()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn sequence(&self) -> i64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Whether the next run fetches the sequence from the ledger
    pub fn needs_refresh(&self) -> bool {
        self.sequence() == 0 || self.force_refresh.load(Ordering::SeqCst)
    }
}

/// Funding worker bound to one channel account
pub struct Minion<C> {
    account: ChannelAccount,
    context: Arc<FundingContext>,
    client: C,
}

impl<C: NetworkClient> Minion<C> {
    pub fn new(keypair: Keypair, context: Arc<FundingContext>, client: C) -> Self {
        Self {
            account: ChannelAccount::new(keypair),
            context,
            client,
        }
    }

    pub fn account(&self) -> &ChannelAccount {
        &self.account
    }

    pub fn address(&self) -> &str {
        self.account.address()
    }

    /// Fund `destination` once. Never retries; a bad sequence only marks the
    /// channel account for refresh on the next run.
    #[instrument(skip(self, destination), fields(minion = %self.account.address(), destination = %destination))]
    pub async fn run(&self, destination: &Destination) -> Result<TransactionResult, FundError> {
        let sequence = self.check_sequence_refresh().await?;

        let exists = if destination.is_contract() {
            false
        } else {
            let balance = self.check_account_exists(&destination.address).await?;
            if let Some(balance) = balance {
                debug!(balance = %format_amount(balance), "destination account exists");
                self.check_balance(balance)?;
            }
            balance.is_some()
        };

        let params = FundingTxParams {
            passphrase: &self.context.network_passphrase,
            funder: &self.context.funder,
            channel: self.account.keypair(),
            sequence,
            base_fee: self.context.base_fee,
            starting_balance: self.context.starting_balance,
        };
        let (kind, signed) = make_funding_tx(&self.client, &params, destination, exists)
            .await
            .map_err(|e| {
                warn!(category = e.category(), error = %e, "failed to build funding transaction");
                e
            })?;

        self.account.sequence.fetch_add(1, Ordering::SeqCst);
        self.submit(kind, signed).await
    }

    /// Cached sequence, fetched from the ledger when unknown or forced.
    async fn check_sequence_refresh(&self) -> Result<i64, FundError> {
        if !self.account.needs_refresh() {
            return Ok(self.account.sequence());
        }
        let details = self
            .client
            .get_account_details(self.account.address())
            .await
            .map_err(FundError::SequenceRefresh)?;
        self.account.sequence.store(details.sequence, Ordering::SeqCst);
        self.account.force_refresh.store(false, Ordering::SeqCst);
        metrics().sequence_refreshes.inc();
        debug!(sequence = details.sequence, "refreshed minion sequence");
        Ok(details.sequence)
    }

    /// Native balance of `address`, or `None` when the account does not exist
    async fn check_account_exists(&self, address: &str) -> Result<Option<i64>, FundError> {
        match self.client.get_account_details(address).await {
            Ok(details) => Ok(Some(details.balance)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(FundError::AccountCheck(e)),
        }
    }

    fn check_balance(&self, balance: i64) -> Result<(), FundError> {
        if balance >= self.context.starting_balance {
            return Err(FundError::AlreadyFunded);
        }
        Ok(())
    }

    async fn submit(
        &self,
        kind: FundingKind,
        signed: SignedTransaction,
    ) -> Result<TransactionResult, FundError> {
        let hash = signed.hash_hex();
        let timer = Timer::new();
        let outcome = self.client.submit_transaction(&signed.envelope_xdr).await;
        timer.observe_duration(&metrics().submit_latency);

        match outcome {
            Ok(()) => {
                metrics().funding_kind.with_label_values(&[kind.as_str()]).inc();
                info!(hash = %hash, kind = kind.as_str(), "funding transaction applied");
                Ok(TransactionResult {
                    successful: true,
                    hash,
                    envelope_xdr: signed.envelope_xdr,
                })
            }
            Err(e) => {
                if e.is_bad_sequence() {
                    self.account.force_refresh.store(true, Ordering::SeqCst);
                    metrics().bad_sequence_errors.inc();
                    warn!(hash = %hash, "bad sequence, minion will refresh on next run");
                }
                if e.is_account_already_exists() {
                    warn!(
                        hash = %hash,
                        result = e.result_string().unwrap_or(""),
                        "destination created by a concurrent request"
                    );
                    return Err(FundError::AccountExists { hash, source: e });
                }
                warn!(
                    hash = %hash,
                    kind = e.kind().as_str(),
                    result = e.result_string().unwrap_or(""),
                    error = %e,
                    "funding transaction failed"
                );
                Err(FundError::Submission { hash, source: e })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressError;

    #[test]
    fn test_builder_errors_keep_simulation_kinds() {
        assert!(matches!(
            FundError::from(TransactionBuilderError::SimulationUnsupported),
            FundError::SimulationUnsupported
        ));
        assert!(matches!(
            FundError::from(TransactionBuilderError::SimulationFailed("trap".into())),
            FundError::SimulationFailed(m) if m == "trap"
        ));
        assert!(matches!(
            FundError::from(TransactionBuilderError::Signing("x".into())),
            FundError::Build(_)
        ));
    }

    #[test]
    fn test_classification() {
        let bad_seq = FundError::Submission {
            hash: "ab".into(),
            source: NetworkError::bad_sequence("tx_bad_seq"),
        };
        assert!(bad_seq.is_bad_sequence());
        assert!(!bad_seq.is_timeout());
        assert_eq!(bad_seq.outcome(), "bad_sequence");

        let timeout = FundError::Submission {
            hash: "ab".into(),
            source: NetworkError::timeout("slow"),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.network_kind(), Some(NetworkErrorKind::Timeout));

        assert!(FundError::AlreadyFunded.is_client_error());
        assert!(FundError::InvalidAddress(AddressError::Unsupported).is_client_error());
        assert!(!FundError::SimulationUnsupported.is_client_error());
        assert_eq!(FundError::AlreadyFunded.network_kind(), None);
        assert_eq!(
            FundError::AlreadyFunded.to_string(),
            "account already funded to starting balance"
        );
    }

    #[test]
    fn test_new_channel_account_needs_refresh() {
        let account = ChannelAccount::new(Keypair::random());
        assert_eq!(account.sequence(), 0);
        assert!(account.needs_refresh());
        account.sequence.store(12, Ordering::SeqCst);
        assert!(!account.needs_refresh());
        account.force_refresh.store(true, Ordering::SeqCst);
        assert!(account.needs_refresh());
    }
}
