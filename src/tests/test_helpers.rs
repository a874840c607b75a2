//! Test Helper Utilities
//!
//! Builds a funded in-memory ledger with a funder and a set of channel
//! accounts, plus the minions and bot wired on top of it.

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Arc;

    use crate::bot::Bot;
    use crate::ledger::NetworkClient;
    use crate::minion::{FundingContext, Minion};
    use crate::test_utils::MockLedger;
    use crate::types::parse_amount;
    use crate::wallet::Keypair;

    pub const PASSPHRASE: &str = "Test SDF Network ; September 2015";

    /// Sequence every channel account starts with
    pub const CHANNEL_SEQUENCE: i64 = 7 << 32;

    pub const FUNDER_SEQUENCE: i64 = 1 << 32;

    pub fn amount(value: &str) -> i64 {
        parse_amount(value).expect("valid test amount")
    }

    pub struct Fixture {
        pub ledger: Arc<MockLedger>,
        pub context: Arc<FundingContext>,
        pub channels: Vec<Keypair>,
    }

    impl Fixture {
        pub fn new(pool_size: usize, starting_balance: &str) -> Self {
            Self::with_ledger(pool_size, starting_balance, |ledger| ledger)
        }

        /// Like [`Fixture::new`], letting the caller seed extra ledger state
        pub fn with_ledger(
            pool_size: usize,
            starting_balance: &str,
            seed: impl FnOnce(MockLedger) -> MockLedger,
        ) -> Self {
            let funder = Keypair::random();
            let channels: Vec<Keypair> = (0..pool_size).map(|_| Keypair::random()).collect();

            let mut ledger = MockLedger::new(PASSPHRASE).with_account(
                funder.address(),
                amount("100000000"),
                FUNDER_SEQUENCE,
            );
            for channel in &channels {
                ledger = ledger.with_account(channel.address(), amount("101"), CHANNEL_SEQUENCE);
            }

            let context = Arc::new(FundingContext {
                funder,
                network_passphrase: PASSPHRASE.to_string(),
                starting_balance: amount(starting_balance),
                base_fee: 100,
            });
            Self {
                ledger: Arc::new(seed(ledger)),
                context,
                channels,
            }
        }

        pub fn funder_address(&self) -> &str {
            self.context.funder.address()
        }

        pub fn minion(&self, index: usize) -> Minion<Arc<MockLedger>> {
            Minion::new(
                self.channels[index].clone(),
                Arc::clone(&self.context),
                Arc::clone(&self.ledger),
            )
        }

        /// Minion for channel `index` talking to `client` instead of the ledger
        pub fn minion_with<C: NetworkClient>(&self, index: usize, client: C) -> Minion<C> {
            Minion::new(self.channels[index].clone(), Arc::clone(&self.context), client)
        }

        pub fn bot(&self) -> Bot<Arc<MockLedger>> {
            let minions = (0..self.channels.len()).map(|i| self.minion(i)).collect();
            Bot::new(minions).expect("fixture has at least one channel")
        }
    }
}
