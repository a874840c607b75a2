//! Scenario tests running the funding flow against the in-memory ledger

mod funding_strategy_tests;
mod sequence_tests;
pub mod test_helpers;
