//! Transaction assembly, hashing, signing and envelope encoding
//!
//! The sequence number placed in a transaction is always `current + 1`, where
//! `current` is the source account's sequence as last seen on the ledger (or
//! as tracked locally by the caller).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    Limits, Memo, Operation, Preconditions, SequenceNumber, SorobanTransactionData, TimeBounds,
    TimePoint, Transaction, TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV1Envelope, VecM, WriteXdr,
};

use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::operations::{muxed_account, network_id};
use crate::wallet::Keypair;

/// A signed transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Network-bound transaction hash
    pub hash: [u8; 32],
    /// Base64 XDR of the signed envelope
    pub envelope_xdr: String,
}

impl SignedTransaction {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Validity window for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// No upper time bound
    Infinite,
    /// Valid until `now + secs`
    TimeoutSecs(u64),
}

impl Validity {
    fn preconditions(self) -> Preconditions {
        let max_time = match self {
            Validity::Infinite => 0,
            Validity::TimeoutSecs(secs) => {
                (chrono::Utc::now().timestamp().max(0) as u64).saturating_add(secs)
            }
        };
        Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(max_time),
        })
    }
}

/// Inputs for assembling a transaction envelope
#[derive(Debug, Clone)]
pub struct TxParams {
    /// Account supplying the sequence number
    pub source: String,
    /// Current ledger sequence of `source`; the transaction uses `sequence + 1`
    pub sequence: i64,
    /// Per-operation inclusion fee in stroops
    pub base_fee: u32,
    /// Extra resource fee from simulation, in stroops
    pub resource_fee: i64,
    pub validity: Validity,
    pub operations: Vec<Operation>,
    pub soroban_data: Option<SorobanTransactionData>,
}

/// Assemble an unsigned transaction
pub fn build_transaction(params: TxParams) -> Result<Transaction, TransactionBuilderError> {
    let op_count = params.operations.len();
    let fee = total_fee(params.base_fee, op_count, params.resource_fee)?;
    Ok(Transaction {
        source_account: muxed_account(&params.source)?,
        fee,
        seq_num: SequenceNumber(params.sequence + 1),
        cond: params.validity.preconditions(),
        memo: Memo::None,
        operations: params.operations.try_into()?,
        ext: match params.soroban_data {
            Some(data) => TransactionExt::V1(data),
            None => TransactionExt::V0,
        },
    })
}

fn total_fee(
    base_fee: u32,
    operations: usize,
    resource_fee: i64,
) -> Result<u32, TransactionBuilderError> {
    let overflow = || TransactionBuilderError::FeeOverflow {
        base_fee,
        operations,
        resource_fee,
    };
    let inclusion = u64::from(base_fee)
        .checked_mul(operations.max(1) as u64)
        .ok_or_else(overflow)?;
    let resource = u64::try_from(resource_fee).map_err(|_| overflow())?;
    u32::try_from(inclusion.checked_add(resource).ok_or_else(overflow)?).map_err(|_| overflow())
}

/// Network-bound hash of a transaction
pub fn transaction_hash(
    tx: &Transaction,
    passphrase: &str,
) -> Result<[u8; 32], TransactionBuilderError> {
    let payload = TransactionSignaturePayload {
        network_id: network_id(passphrase),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Sha256::digest(&bytes).into())
}

/// Sign `tx` with every key in `signers` and encode the envelope
pub fn sign_transaction(
    tx: Transaction,
    passphrase: &str,
    signers: &[&Keypair],
) -> Result<SignedTransaction, TransactionBuilderError> {
    let hash = transaction_hash(&tx, passphrase)?;
    let signatures = signers
        .iter()
        .map(|kp| {
            kp.sign_decorated(&hash)
                .map_err(|e| TransactionBuilderError::Signing(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: signatures.try_into()?,
    });
    Ok(SignedTransaction {
        hash,
        envelope_xdr: encode_envelope(&envelope)?,
    })
}

/// Encode an envelope without signatures, as sent for simulation
pub fn unsigned_envelope_xdr(tx: Transaction) -> Result<String, TransactionBuilderError> {
    encode_envelope(&TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: VecM::default(),
    }))
}

fn encode_envelope(envelope: &TransactionEnvelope) -> Result<String, TransactionBuilderError> {
    Ok(STANDARD.encode(envelope.to_xdr(Limits::none())?))
}
