//! Pool initializer
//!
//! Creates the channel accounts in batches. Each batch is one transaction
//! from the funder holding a create-account op per new minion. The funder's
//! sequence is fetched again before every attempt so each batch builds on
//! the ledger state left by the previous one.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{info, instrument, warn};

use crate::bot::Bot;
use crate::ledger::{NetworkClient, NetworkError};
use crate::metrics::metrics;
use crate::minion::{FundingContext, Minion};
use crate::tx_builder::operations::create_account_op;
use crate::tx_builder::{build_transaction, sign_transaction, TransactionBuilderError, TxParams, Validity};
use crate::wallet::Keypair;

/// Validity window of a batch transaction
const BATCH_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("refreshing bot seqnum: {0}")]
    FunderRefresh(#[source] NetworkError),

    #[error("unable to build create accounts tx: {0}")]
    Build(#[from] TransactionBuilderError),

    #[error("submitting create accounts tx: {0}")]
    Submit(#[source] NetworkError),

    #[error("submitting create accounts tx after retrying {retries} times: {source}")]
    RetriesExhausted {
        retries: usize,
        #[source]
        source: NetworkError,
    },

    #[error("no minions were created")]
    NoMinions,
}

impl BootstrapError {
    /// Only submission timeouts are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, BootstrapError::Submit(e) if e.is_timeout())
    }
}

/// Pool sizing and retry policy
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub num_minions: usize,
    pub batch_size: usize,
    /// Extra attempts per batch after a submission timeout
    pub submit_retries: usize,
    /// Starting balance of each channel account, in stroops
    pub minion_balance: i64,
    pub retry_delay: Duration,
}

/// Minions created so far, and the error that stopped creation early
pub struct BootstrapReport<C> {
    pub minions: Vec<Minion<C>>,
    pub error: Option<BootstrapError>,
}

/// Create `settings.num_minions` channel accounts funded by the funder.
///
/// On failure, minions from batches that already landed are returned
/// together with the error.
#[instrument(skip_all, fields(num_minions = settings.num_minions, batch_size = settings.batch_size))]
pub async fn create_minion_accounts<C: NetworkClient + Clone>(
    client: &C,
    context: Arc<FundingContext>,
    settings: &BootstrapSettings,
) -> BootstrapReport<C> {
    let batch_size = settings.batch_size.max(1);
    let mut minions = Vec::with_capacity(settings.num_minions);

    while minions.len() < settings.num_minions {
        let count = batch_size.min(settings.num_minions - minions.len());
        info!(count, created = minions.len(), "creating new minion accounts");

        let batch = match submit_batch_with_retry(client, &context, count, settings).await {
            Ok(batch) => batch,
            Err(error) => {
                metrics().bootstrap_batches.with_label_values(&["failed"]).inc();
                warn!(created = minions.len(), error = %error, "minion creation stopped");
                return BootstrapReport {
                    minions,
                    error: Some(error),
                };
            }
        };

        metrics().bootstrap_batches.with_label_values(&["created"]).inc();
        minions.extend(
            batch
                .into_iter()
                .map(|kp| Minion::new(kp, Arc::clone(&context), client.clone())),
        );
        info!(count, created = minions.len(), "submitted create accounts tx");
    }

    BootstrapReport {
        minions,
        error: None,
    }
}

/// Every attempt creates a fresh set of keypairs. A timed-out batch may
/// still have been applied, and resubmitting its accounts would only fail
/// with "already exists".
async fn submit_batch_with_retry<C: NetworkClient>(
    client: &C,
    context: &FundingContext,
    count: usize,
    settings: &BootstrapSettings,
) -> Result<Vec<Keypair>, BootstrapError> {
    let mut attempts = 0usize;
    let strategy = FixedInterval::new(settings.retry_delay).take(settings.submit_retries);
    let result = RetryIf::spawn(
        strategy,
        || {
            attempts += 1;
            if attempts > 1 {
                metrics().bootstrap_retries.inc();
                warn!(attempt = attempts, "trying again to submit create accounts tx");
            }
            submit_batch(client, context, count, settings.minion_balance)
        },
        BootstrapError::is_retryable,
    )
    .await;

    match result {
        Err(BootstrapError::Submit(source)) if source.is_timeout() && attempts > 1 => {
            Err(BootstrapError::RetriesExhausted {
                retries: attempts - 1,
                source,
            })
        }
        other => other,
    }
}

async fn submit_batch<C: NetworkClient>(
    client: &C,
    context: &FundingContext,
    count: usize,
    minion_balance: i64,
) -> Result<Vec<Keypair>, BootstrapError> {
    let batch: Vec<Keypair> = (0..count).map(|_| Keypair::random()).collect();
    let funder = context.funder.address();
    let details = client
        .get_account_details(funder)
        .await
        .map_err(BootstrapError::FunderRefresh)?;

    let operations = batch
        .iter()
        .map(|kp| create_account_op(None, kp.address(), minion_balance))
        .collect::<Result<Vec<_>, _>>()?;
    let tx = build_transaction(TxParams {
        source: funder.to_string(),
        sequence: details.sequence,
        base_fee: context.base_fee,
        resource_fee: 0,
        validity: Validity::TimeoutSecs(BATCH_TIMEOUT_SECS),
        operations,
        soroban_data: None,
    })?;
    let signed = sign_transaction(tx, &context.network_passphrase, &[&context.funder])?;

    client
        .submit_transaction(&signed.envelope_xdr)
        .await
        .map_err(BootstrapError::Submit)?;
    Ok(batch)
}

/// Build the friendbot, tolerating partial pool creation.
///
/// Fails only when not a single minion could be created.
pub async fn init_friendbot<C: NetworkClient + Clone + 'static>(
    client: C,
    context: FundingContext,
    settings: &BootstrapSettings,
) -> Result<Bot<C>, BootstrapError> {
    info!(
        funder = context.funder.address(),
        num_minions = settings.num_minions,
        "found all valid params, creating minions"
    );
    let report = create_minion_accounts(&client, Arc::new(context), settings).await;
    match report.error {
        Some(error) if report.minions.is_empty() => return Err(error),
        Some(error) => warn!(
            created = report.minions.len(),
            error = %error,
            "continuing with a partial minion pool"
        ),
        None => {}
    }

    metrics().minion_pool_size.set(report.minions.len() as i64);
    info!(minions = report.minions.len(), "adding minions to friendbot");
    Bot::new(report.minions).map_err(|_| BootstrapError::NoMinions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_submit_timeouts_retry() {
        assert!(BootstrapError::Submit(NetworkError::timeout("504")).is_retryable());
        assert!(!BootstrapError::Submit(NetworkError::bad_sequence("seq")).is_retryable());
        assert!(!BootstrapError::FunderRefresh(NetworkError::timeout("504")).is_retryable());
        assert!(!BootstrapError::NoMinions.is_retryable());
    }
}
