//! Common types used throughout the friendbot

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of stroops in one unit of the native asset.
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

const AMOUNT_DECIMALS: usize = 7;

/// Kind of ledger entity a destination address names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationKind {
    /// Classic `G...` account, funded with create-account or payment ops
    ClassicAccount,
    /// `C...` contract, funded by invoking the native asset contract
    Contract,
}

/// A classified funding destination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub address: String,
    pub kind: DestinationKind,
}

impl Destination {
    pub fn classic(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: DestinationKind::ClassicAccount,
        }
    }

    pub fn contract(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: DestinationKind::Contract,
        }
    }

    pub fn is_contract(&self) -> bool {
        self.kind == DestinationKind::Contract
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Final transaction result returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub successful: bool,
    pub hash: String,
    pub envelope_xdr: String,
}

/// Amount parsing errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,

    #[error("invalid amount {0:?}: expected a non-negative decimal")]
    Malformed(String),

    #[error("invalid amount {0:?}: more than 7 decimal places")]
    TooPrecise(String),

    #[error("amount {0:?} overflows")]
    Overflow(String),
}

/// Parse a decimal native amount ("10000.00") into stroops.
pub fn parse_amount(input: &str) -> Result<i64, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Malformed(input.to_string()));
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(AmountError::Malformed(input.to_string()));
    }
    if frac.len() > AMOUNT_DECIMALS {
        return Err(AmountError::TooPrecise(input.to_string()));
    }

    let overflow = || AmountError::Overflow(input.to_string());
    let whole_units: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut frac_stroops: i64 = 0;
    for (i, b) in frac.bytes().enumerate() {
        let digit = i64::from(b - b'0');
        frac_stroops += digit * 10_i64.pow((AMOUNT_DECIMALS - 1 - i) as u32);
    }

    whole_units
        .checked_mul(STROOPS_PER_UNIT)
        .and_then(|v| v.checked_add(frac_stroops))
        .ok_or_else(overflow)
}

/// Render stroops as a 7-decimal amount string.
pub fn format_amount(stroops: i64) -> String {
    let sign = if stroops < 0 { "-" } else { "" };
    let abs = stroops.unsigned_abs();
    let unit = STROOPS_PER_UNIT as u64;
    format!("{}{}.{:07}", sign, abs / unit, abs % unit)
}
