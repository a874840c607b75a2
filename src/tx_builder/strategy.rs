//! Funding transaction strategy
//!
//! Picks the operation from the destination kind and whether the destination
//! already exists:
//!
//! | destination          | operation                            |
//! |----------------------|--------------------------------------|
//! | classic, missing     | create account with starting balance |
//! | classic, existing    | payment of the full starting balance |
//! | contract             | simulated native `transfer` invoke   |
//!
//! The funder is the source of every operation; the channel account is the
//! transaction source and only supplies the sequence number. Both sign.

use crate::ledger::NetworkClient;
use crate::tx_builder::builder::{
    build_transaction, sign_transaction, SignedTransaction, TxParams, Validity,
};
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::operations::{create_account_op, invoke_transfer_op, payment_op};
use crate::tx_builder::simulate::{simulate_contract_transfer, ContractTransfer};
use crate::types::{Destination, DestinationKind};
use crate::wallet::Keypair;

/// Which funding path a transaction took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundingKind {
    CreateAccount,
    Payment,
    ContractInvoke,
}

impl FundingKind {
    pub fn select(kind: DestinationKind, exists: bool) -> Self {
        match (kind, exists) {
            (DestinationKind::Contract, _) => FundingKind::ContractInvoke,
            (DestinationKind::ClassicAccount, true) => FundingKind::Payment,
            (DestinationKind::ClassicAccount, false) => FundingKind::CreateAccount,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FundingKind::CreateAccount => "create_account",
            FundingKind::Payment => "payment",
            FundingKind::ContractInvoke => "contract_invoke",
        }
    }
}

/// Everything the strategy needs besides the destination
#[derive(Debug, Clone, Copy)]
pub struct FundingTxParams<'a> {
    pub passphrase: &'a str,
    pub funder: &'a Keypair,
    pub channel: &'a Keypair,
    /// Current sequence of the channel account
    pub sequence: i64,
    pub base_fee: u32,
    /// Amount in stroops
    pub starting_balance: i64,
}

/// Build and sign the funding transaction for `destination`.
///
/// Only the contract path touches the network, to simulate.
pub async fn make_funding_tx<C: NetworkClient + ?Sized>(
    client: &C,
    params: &FundingTxParams<'_>,
    destination: &Destination,
    exists: bool,
) -> Result<(FundingKind, SignedTransaction), TransactionBuilderError> {
    let funder = params.funder.address();
    let kind = FundingKind::select(destination.kind, exists);

    let (operation, resource_fee, soroban_data) = match kind {
        FundingKind::CreateAccount => (
            create_account_op(Some(funder), &destination.address, params.starting_balance)?,
            0,
            None,
        ),
        FundingKind::Payment => (
            payment_op(funder, &destination.address, params.starting_balance)?,
            0,
            None,
        ),
        FundingKind::ContractInvoke => {
            let sim = simulate_contract_transfer(
                client,
                &ContractTransfer {
                    passphrase: params.passphrase,
                    source: params.channel.address(),
                    sequence: params.sequence,
                    base_fee: params.base_fee,
                    funder,
                    contract: &destination.address,
                    amount: params.starting_balance,
                },
            )
            .await?;
            let op = invoke_transfer_op(
                params.passphrase,
                funder,
                &destination.address,
                params.starting_balance,
                sim.auth,
            )?;
            (op, sim.min_resource_fee, Some(sim.transaction_data))
        }
    };

    let tx = build_transaction(TxParams {
        source: params.channel.address().to_string(),
        sequence: params.sequence,
        base_fee: params.base_fee,
        resource_fee,
        validity: Validity::Infinite,
        operations: vec![operation],
        soroban_data,
    })?;
    let signed = sign_transaction(tx, params.passphrase, &[params.channel, params.funder])?;
    Ok((kind, signed))
}
