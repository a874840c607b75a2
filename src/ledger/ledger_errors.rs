use base64::{engine::general_purpose::STANDARD, Engine as _};
use stellar_xdr::curr::{
    CreateAccountResult, Limits, OperationResult, OperationResultTr, ReadXdr, TransactionResult,
    TransactionResultResult,
};
use thiserror::Error;

/// Raw result XDR the ledger returns when a create-account op targets an
/// account that already exists.
pub const CREATE_ACCOUNT_ALREADY_EXIST_XDR: &str = "AAAAAAAAAGT/////AAAAAQAAAAAAAAAA/////AAAAAA=";

/// Backend-independent classification of a network failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    /// Requested resource (usually an account) does not exist
    NotFound,
    /// Transaction sequence number did not match the ledger
    BadSequence,
    /// The backend gave up waiting for a result
    Timeout,
    /// The backend cannot perform the requested capability
    Unsupported,
    /// Anything else
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::NotFound => "not_found",
            NetworkErrorKind::BadSequence => "bad_sequence",
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Unsupported => "unsupported",
            NetworkErrorKind::Other => "other",
        }
    }
}

/// Error returned by every [`NetworkClient`](super::NetworkClient) backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct NetworkError {
    kind: NetworkErrorKind,
    message: String,
    result_xdr: Option<String>,
    diagnostic_events: Vec<String>,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            result_xdr: None,
            diagnostic_events: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::NotFound, message)
    }

    pub fn bad_sequence(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::BadSequence, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Timeout, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Unsupported, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Other, message)
    }

    /// Attach the raw transaction result XDR reported by the ledger
    pub fn with_result_xdr(mut self, result_xdr: impl Into<String>) -> Self {
        self.result_xdr = Some(result_xdr.into());
        self
    }

    pub fn with_diagnostic_events(mut self, events: Vec<String>) -> Self {
        self.diagnostic_events = events;
        self
    }

    pub fn kind(&self) -> NetworkErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == NetworkErrorKind::NotFound
    }

    pub fn is_bad_sequence(&self) -> bool {
        self.kind == NetworkErrorKind::BadSequence
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == NetworkErrorKind::Timeout
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind == NetworkErrorKind::Unsupported
    }

    /// Raw result string for diagnostics, if the backend provided one
    pub fn result_string(&self) -> Option<&str> {
        self.result_xdr.as_deref()
    }

    pub fn diagnostic_events_xdr(&self) -> &[String] {
        &self.diagnostic_events
    }

    /// Whether the ledger rejected a create-account op because the
    /// destination already exists.
    pub fn is_account_already_exists(&self) -> bool {
        let Some(raw) = self.result_xdr.as_deref() else {
            return false;
        };
        if raw == CREATE_ACCOUNT_ALREADY_EXIST_XDR {
            return true;
        }
        decode_transaction_result(raw)
            .map(|result| create_account_already_exists(&result))
            .unwrap_or(false)
    }
}

/// Decode a base64 `TransactionResult`
pub fn decode_transaction_result(raw: &str) -> Option<TransactionResult> {
    let bytes = STANDARD.decode(raw).ok()?;
    TransactionResult::from_xdr(bytes, Limits::none()).ok()
}

/// Whether a transaction result reports a bad sequence number
pub fn is_bad_sequence_result(result: &TransactionResult) -> bool {
    matches!(result.result, TransactionResultResult::TxBadSeq)
}

fn create_account_already_exists(result: &TransactionResult) -> bool {
    let TransactionResultResult::TxFailed(ops) = &result.result else {
        return false;
    };
    ops.iter().any(|op| {
        matches!(
            op,
            OperationResult::OpInner(OperationResultTr::CreateAccount(
                CreateAccountResult::AlreadyExist
            ))
        )
    })
}
