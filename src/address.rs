//! Destination address classification
//!
//! Addresses are classified purely from their strkey encoding (version byte
//! and checksum); the ledger is never consulted here.

use stellar_strkey::{ed25519, Contract, Strkey};
use thiserror::Error;

use crate::types::Destination;

/// Shortest input that could possibly be a strkey (version byte + checksum).
const MIN_STRKEY_LEN: usize = 5;

/// Reasons an address is rejected before dispatch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("strkey is {0} bytes long; minimum valid length is {MIN_STRKEY_LEN}")]
    TooShort(usize),

    #[error("invalid strkey: {0}")]
    Decode(String),

    #[error("unsupported address type: expected an account (G...) or contract (C...) address")]
    Unsupported,
}

/// Classify a destination address as a classic account or a contract.
pub fn classify(address: &str) -> Result<Destination, AddressError> {
    if address.len() < MIN_STRKEY_LEN {
        return Err(AddressError::TooShort(address.len()));
    }
    match Strkey::from_string(address) {
        Ok(Strkey::PublicKeyEd25519(_)) => Ok(Destination::classic(address)),
        Ok(Strkey::Contract(_)) => Ok(Destination::contract(address)),
        Ok(_) => Err(AddressError::Unsupported),
        Err(e) => Err(AddressError::Decode(e.to_string())),
    }
}

/// Raw ed25519 key bytes of a `G...` account address.
pub fn account_key_bytes(address: &str) -> Result<[u8; 32], AddressError> {
    ed25519::PublicKey::from_string(address)
        .map(|pk| pk.0)
        .map_err(|e| AddressError::Decode(e.to_string()))
}

/// Raw contract id bytes of a `C...` contract address.
pub fn contract_id_bytes(address: &str) -> Result<[u8; 32], AddressError> {
    Contract::from_string(address)
        .map(|c| c.0)
        .map_err(|e| AddressError::Decode(e.to_string()))
}

/// Encode raw ed25519 key bytes as a `G...` address.
pub fn encode_account(key: [u8; 32]) -> String {
    ed25519::PublicKey(key).to_string()
}

/// Encode raw contract id bytes as a `C...` address.
pub fn encode_contract(id: [u8; 32]) -> String {
    Contract(id).to_string()
}
