//! Sequence Handling Tests
//!
//! Cached channel sequences, recovery after a bad sequence, and the
//! collision of two requests on the same minion.

#[cfg(test)]
mod sequence_tests {
    use crate::ledger::NetworkError;
    use crate::minion::FundError;
    use crate::tests::test_helpers::test_helpers::{amount, Fixture, CHANNEL_SEQUENCE};
    use crate::types::Destination;
    use crate::wallet::Keypair;

    fn new_destination() -> Destination {
        Destination::classic(Keypair::random().address())
    }

    #[tokio::test]
    async fn test_sequence_fetched_once_then_incremented() {
        let fixture = Fixture::new(1, "10000");
        let minion = fixture.minion(0);
        let channel = fixture.channels[0].address();

        for _ in 0..3 {
            minion.run(&new_destination()).await.unwrap();
        }

        let sequences: Vec<i64> = fixture.ledger.applied().iter().map(|tx| tx.sequence).collect();
        assert_eq!(
            sequences,
            vec![CHANNEL_SEQUENCE + 1, CHANNEL_SEQUENCE + 2, CHANNEL_SEQUENCE + 3]
        );
        assert_eq!(fixture.ledger.lookups(channel), 1);
        assert_eq!(minion.account().sequence(), CHANNEL_SEQUENCE + 3);
        assert!(!minion.account().needs_refresh());
    }

    #[tokio::test]
    async fn test_bad_sequence_forces_refresh_on_next_run() {
        let fixture = Fixture::new(1, "10000");
        let minion = fixture.minion(0);
        let channel = fixture.channels[0].address();
        fixture.ledger.fail_next_submit(NetworkError::bad_sequence("tx_bad_seq"));

        let err = minion.run(&new_destination()).await.unwrap_err();
        assert!(err.is_bad_sequence());
        assert_eq!(err.outcome(), "bad_sequence");
        assert!(minion.account().needs_refresh());
        assert_eq!(fixture.ledger.lookups(channel), 1);

        // The failed run never retried on its own.
        assert_eq!(fixture.ledger.submit_count(), 1);

        minion.run(&new_destination()).await.unwrap();
        assert_eq!(fixture.ledger.lookups(channel), 2);
        assert!(!minion.account().needs_refresh());
        assert_eq!(fixture.ledger.applied()[0].sequence, CHANNEL_SEQUENCE + 1);
    }

    #[tokio::test]
    async fn test_other_failures_keep_cached_sequence() {
        let fixture = Fixture::new(1, "10000");
        let minion = fixture.minion(0);
        fixture.ledger.fail_next_submit(NetworkError::timeout("gateway timeout"));

        let err = minion.run(&new_destination()).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!minion.account().needs_refresh());
        assert_eq!(minion.account().sequence(), CHANNEL_SEQUENCE + 1);
        assert_eq!(fixture.ledger.lookups(fixture.channels[0].address()), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_aborts_before_submit() {
        let fixture = Fixture::new(1, "10000");
        // A minion whose channel account is not on the ledger.
        let minion = crate::minion::Minion::new(
            Keypair::random(),
            std::sync::Arc::clone(&fixture.context),
            std::sync::Arc::clone(&fixture.ledger),
        );

        let err = minion.run(&new_destination()).await.unwrap_err();
        assert!(matches!(err, FundError::SequenceRefresh(ref e) if e.is_not_found()));
        assert_eq!(fixture.ledger.submit_count(), 0);
        assert!(minion.account().needs_refresh());
    }

    #[tokio::test]
    async fn test_concurrent_runs_on_one_minion_collide_then_recover() {
        let fixture = Fixture::new(1, "10000");
        let minion = fixture.minion(0);
        let channel = fixture.channels[0].address();
        minion.run(&new_destination()).await.unwrap();

        let (dest_a, dest_b) = (new_destination(), new_destination());
        let (first, second) = tokio::join!(minion.run(&dest_a), minion.run(&dest_b));

        // Both read the same cached sequence; the ledger accepts one.
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let failure = outcomes
            .iter()
            .find_map(|r| r.as_ref().err())
            .expect("one run must fail");
        assert!(failure.is_bad_sequence());
        assert!(minion.account().needs_refresh());
        assert_eq!(fixture.ledger.lookups(channel), 1);

        minion.run(&new_destination()).await.unwrap();
        assert_eq!(fixture.ledger.lookups(channel), 2);
        let sequences: Vec<i64> = fixture.ledger.applied().iter().map(|tx| tx.sequence).collect();
        assert_eq!(
            sequences,
            vec![CHANNEL_SEQUENCE + 1, CHANNEL_SEQUENCE + 2, CHANNEL_SEQUENCE + 3]
        );
    }

    #[tokio::test]
    async fn test_destination_created_concurrently_reports_account_exists() {
        let fixture = Fixture::new(2, "10000");
        let first = fixture.minion(0);
        let second = fixture.minion(1);
        let dest = new_destination();

        let (a, b) = tokio::join!(first.run(&dest), second.run(&dest));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let failure = outcomes
            .iter()
            .find_map(|r| r.as_ref().err())
            .expect("one run must fail");
        let FundError::AccountExists { hash, source } = failure else {
            panic!("expected AccountExists, got {failure:?}");
        };
        assert_eq!(hash.len(), 64);
        assert!(source.is_account_already_exists());
        assert!(source.result_string().is_some());
        assert_eq!(failure.network_kind(), Some(crate::ledger::NetworkErrorKind::Other));
        assert_eq!(failure.outcome(), "account_exists");
        assert_eq!(fixture.ledger.balance(&dest.address), Some(amount("10000")));
    }
}
