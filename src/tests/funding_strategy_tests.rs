//! Funding Strategy Tests
//!
//! Create, top-up and contract transfer paths end to end, and the existence
//! lookup that picks between them.

#[cfg(test)]
mod funding_strategy_tests {
    use crate::address::encode_contract;
    use crate::minion::FundError;
    use crate::test_utils::MOCK_RESOURCE_FEE;
    use crate::tests::test_helpers::test_helpers::{amount, Fixture, CHANNEL_SEQUENCE};
    use crate::types::Destination;
    use crate::wallet::Keypair;

    fn contract_destination() -> Destination {
        Destination::contract(encode_contract(rand::random()))
    }

    #[tokio::test]
    async fn test_underfunded_account_gets_full_starting_balance() {
        let dest = Keypair::random();
        let fixture = Fixture::with_ledger(1, "10000.00", |ledger| {
            ledger.with_account(dest.address(), amount("9999.9999999"), 3 << 32)
        });

        let result = fixture.bot().pay(dest.address()).await.unwrap();

        assert!(result.successful);
        assert_eq!(
            fixture.ledger.balance(dest.address()),
            Some(amount("9999.9999999") + amount("10000"))
        );
        assert_eq!(fixture.ledger.applied()[0].kinds, vec!["payment"]);
        assert_eq!(fixture.ledger.simulate_count(), 0);
    }

    #[tokio::test]
    async fn test_funded_account_rejected_without_submitting() {
        let dest = Keypair::random();
        let fixture = Fixture::with_ledger(1, "10000", |ledger| {
            ledger.with_account(dest.address(), amount("10000"), 3 << 32)
        });
        let minion = fixture.minion(0);

        let err = minion.run(&Destination::classic(dest.address())).await.unwrap_err();

        assert!(matches!(err, FundError::AlreadyFunded));
        assert_eq!(err.to_string(), "account already funded to starting balance");
        assert_eq!(fixture.ledger.submit_count(), 0);
        // Nothing was consumed from the channel's sequence.
        assert_eq!(minion.account().sequence(), CHANNEL_SEQUENCE);
        assert_eq!(fixture.ledger.balance(dest.address()), Some(amount("10000")));
    }

    #[tokio::test]
    async fn test_second_request_for_same_address_is_already_funded() {
        let fixture = Fixture::new(2, "10000");
        let bot = fixture.bot();
        let dest = Keypair::random();

        bot.pay(dest.address()).await.unwrap();
        let err = bot.pay(dest.address()).await.unwrap_err();

        assert!(matches!(err, FundError::AlreadyFunded));
        assert_eq!(fixture.ledger.submit_count(), 1);
        assert_eq!(fixture.ledger.balance(dest.address()), Some(amount("10000")));
    }

    #[tokio::test]
    async fn test_contract_destination_simulated_without_lookup() {
        let fixture = Fixture::new(1, "10000");
        let dest = contract_destination();

        let result = fixture.bot().fund(&dest).await.unwrap();

        assert!(result.successful);
        assert_eq!(fixture.ledger.lookups(&dest.address), 0);
        assert_eq!(fixture.ledger.simulate_count(), 1);
        assert_eq!(fixture.ledger.submit_count(), 1);
        assert_eq!(
            fixture.ledger.contract_balance(&dest.address),
            i128::from(amount("10000"))
        );
        assert_eq!(fixture.ledger.applied()[0].kinds, vec!["contract_invoke"]);
        // Inclusion fee plus the simulated resource fee.
        assert_eq!(
            fixture.ledger.balance(fixture.channels[0].address()),
            Some(amount("101") - 100 - MOCK_RESOURCE_FEE)
        );
    }

    #[tokio::test]
    async fn test_contract_destination_funded_again_on_repeat() {
        let fixture = Fixture::new(1, "50");
        let bot = fixture.bot();
        let dest = contract_destination();

        bot.fund(&dest).await.unwrap();
        bot.fund(&dest).await.unwrap();

        assert_eq!(
            fixture.ledger.contract_balance(&dest.address),
            i128::from(amount("100"))
        );
    }

    #[tokio::test]
    async fn test_contract_destination_without_simulation_support() {
        let fixture = Fixture::new(1, "10000");
        fixture.ledger.set_simulation_supported(false);
        let minion = fixture.minion(0);

        let err = minion.run(&contract_destination()).await.unwrap_err();

        assert!(matches!(err, FundError::SimulationUnsupported));
        assert!(!err.is_client_error());
        assert_eq!(fixture.ledger.submit_count(), 0);
        assert_eq!(minion.account().sequence(), CHANNEL_SEQUENCE);

        // Classic funding never needs simulation.
        minion.run(&Destination::classic(Keypair::random().address())).await.unwrap();
        assert_eq!(fixture.ledger.applied()[0].sequence, CHANNEL_SEQUENCE + 1);
    }

    #[tokio::test]
    async fn test_classic_paths_never_simulate() {
        let existing = Keypair::random();
        let fixture = Fixture::with_ledger(1, "100", |ledger| {
            ledger.with_account(existing.address(), amount("1"), 3 << 32)
        });
        let bot = fixture.bot();

        bot.pay(existing.address()).await.unwrap();
        bot.pay(Keypair::random().address()).await.unwrap();

        assert_eq!(fixture.ledger.simulate_count(), 0);
        let kinds: Vec<_> = fixture
            .ledger
            .applied()
            .into_iter()
            .flat_map(|tx| tx.kinds)
            .collect();
        assert_eq!(kinds, vec!["payment", "create_account"]);
    }
}
