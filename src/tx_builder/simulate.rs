//! Simulation of contract transfers
//!
//! Contract destinations need resource data and authorization entries that
//! are only known after a dry run. The simulated envelope carries the same
//! source, sequence and operation as the one that is later signed, but no
//! signatures and no resource data.

use tracing::debug;

use crate::ledger::{NetworkClient, SimulationResult};
use crate::tx_builder::builder::{build_transaction, unsigned_envelope_xdr, TxParams, Validity};
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::operations::invoke_transfer_op;

/// Inputs of a simulated transfer into a contract
#[derive(Debug, Clone, Copy)]
pub struct ContractTransfer<'a> {
    pub passphrase: &'a str,
    /// Transaction source (the channel account)
    pub source: &'a str,
    pub sequence: i64,
    pub base_fee: u32,
    /// Account whose balance backs the transfer
    pub funder: &'a str,
    pub contract: &'a str,
    pub amount: i64,
}

/// Dry-run `transfer(funder, contract, amount)` and return the resources
/// the final transaction has to carry.
pub async fn simulate_contract_transfer<C: NetworkClient + ?Sized>(
    client: &C,
    transfer: &ContractTransfer<'_>,
) -> Result<SimulationResult, TransactionBuilderError> {
    let op = invoke_transfer_op(
        transfer.passphrase,
        transfer.funder,
        transfer.contract,
        transfer.amount,
        Vec::new(),
    )?;
    let tx = build_transaction(TxParams {
        source: transfer.source.to_string(),
        sequence: transfer.sequence,
        base_fee: transfer.base_fee,
        resource_fee: 0,
        validity: Validity::Infinite,
        operations: vec![op],
        soroban_data: None,
    })?;
    let envelope = unsigned_envelope_xdr(tx)?;

    let sim = client
        .simulate_transaction(&envelope)
        .await
        .map_err(TransactionBuilderError::from_simulation)?;
    if sim.min_resource_fee < 0 {
        return Err(TransactionBuilderError::SimulationFailed(format!(
            "negative resource fee {}",
            sim.min_resource_fee
        )));
    }
    debug!(
        contract = transfer.contract,
        min_resource_fee = sim.min_resource_fee,
        auth_entries = sim.auth.len(),
        "simulated contract transfer"
    );
    Ok(sim)
}
