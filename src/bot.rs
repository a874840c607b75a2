//! Pool dispatcher
//!
//! Routes each funding request to the next minion in round-robin order. The
//! cursor lock covers only the index read-and-advance; the minion runs on
//! its own task outside of it and reports back over a one-shot channel.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, Instrument};

use crate::address::classify;
use crate::ledger::NetworkClient;
use crate::metrics::{metrics, Timer};
use crate::minion::{FundError, Minion};
use crate::types::{Destination, TransactionResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BotError {
    #[error("friendbot needs at least one minion")]
    NoMinions,
}

/// The friendbot: an ordered pool of minions and a round-robin cursor
pub struct Bot<C> {
    minions: Vec<Arc<Minion<C>>>,
    next_minion: Mutex<usize>,
}

impl<C: NetworkClient + 'static> Bot<C> {
    pub fn new(minions: Vec<Minion<C>>) -> Result<Self, BotError> {
        if minions.is_empty() {
            return Err(BotError::NoMinions);
        }
        Ok(Self {
            minions: minions.into_iter().map(Arc::new).collect(),
            next_minion: Mutex::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.minions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minions.is_empty()
    }

    pub fn minions(&self) -> &[Arc<Minion<C>>] {
        &self.minions
    }

    /// Pick the minion under the cursor and advance it
    pub(crate) fn next_minion(&self) -> (usize, Arc<Minion<C>>) {
        let mut cursor = self.next_minion.lock();
        let index = *cursor;
        *cursor = (index + 1) % self.minions.len();
        (index, Arc::clone(&self.minions[index]))
    }

    /// Classify `address` and fund it
    pub async fn pay(&self, address: &str) -> Result<TransactionResult, FundError> {
        let destination = classify(address)?;
        self.fund(&destination).await
    }

    /// Fund a classified destination with the next minion
    pub async fn fund(&self, destination: &Destination) -> Result<TransactionResult, FundError> {
        let timer = Timer::new();
        let (index, minion) = self.next_minion();
        debug!(minion_index = index, minion = minion.address(), "dispatching funding request");

        let (result_tx, result_rx) = oneshot::channel();
        let destination = destination.clone();
        tokio::spawn(
            async move {
                let result = minion.run(&destination).await;
                // The caller may have gone away; the ledger outcome stands either way.
                let _ = result_tx.send(result);
            }
            .in_current_span(),
        );

        let result = result_rx.await.unwrap_or(Err(FundError::WorkerLost));
        timer.observe_duration(&metrics().fund_latency);
        metrics().record_fund_outcome(match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AccountDetails, NetworkError, SimulationResult};
    use crate::minion::FundingContext;
    use crate::wallet::Keypair;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl NetworkClient for Unreachable {
        async fn submit_transaction(&self, _envelope: &str) -> Result<(), NetworkError> {
            Err(NetworkError::other("offline"))
        }

        async fn get_account_details(&self, _account: &str) -> Result<AccountDetails, NetworkError> {
            Err(NetworkError::other("offline"))
        }

        async fn simulate_transaction(&self, _envelope: &str) -> Result<SimulationResult, NetworkError> {
            Err(NetworkError::unsupported("offline"))
        }
    }

    fn minions(n: usize) -> Vec<Minion<Unreachable>> {
        let context = Arc::new(FundingContext {
            funder: Keypair::random(),
            network_passphrase: "Test SDF Network ; September 2015".into(),
            starting_balance: 100_000_000_000,
            base_fee: 100,
        });
        (0..n)
            .map(|_| Minion::new(Keypair::random(), Arc::clone(&context), Unreachable))
            .collect()
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert_eq!(Bot::new(minions(0)).err(), Some(BotError::NoMinions));
    }

    #[test]
    fn test_cursor_wraps() {
        let bot = Bot::new(minions(3)).unwrap();
        let picked: Vec<usize> = (0..7).map(|_| bot.next_minion().0).collect();
        assert_eq!(picked, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_invalid_address_never_dispatches() {
        let bot = Bot::new(minions(2)).unwrap();
        let err = bot.pay("not-an-address").await.unwrap_err();
        assert!(matches!(err, FundError::InvalidAddress(_)));
        assert_eq!(bot.next_minion().0, 0);
    }

    #[tokio::test]
    async fn test_worker_outcome_returned_verbatim() {
        let bot = Bot::new(minions(1)).unwrap();
        let err = bot
            .pay(Keypair::random().address())
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::SequenceRefresh(_)));
    }
}
