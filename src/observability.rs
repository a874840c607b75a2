//! Observability module for correlation and tracing

use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

use crate::types::Destination;

/// Header a caller can use to supply its own correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id that is accepted as-is
const MAX_EXTERNAL_ID_LEN: usize = 128;

/// Correlation ID for tracking a funding request across components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse a caller-supplied id when it is printable and short, otherwise
    /// mint a fresh one
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v)
                if !v.is_empty()
                    && v.len() <= MAX_EXTERNAL_ID_LEN
                    && v.chars().all(|c| c.is_ascii_graphic()) =>
            {
                Self(v.to_string())
            }
            _ => Self::new(),
        }
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span wrapping one funding request from dispatch to outcome
pub fn fund_span(correlation_id: &CorrelationId, destination: &Destination) -> Span {
    tracing::info_span!(
        "fund",
        correlation_id = %correlation_id,
        destination = %destination.address,
        kind = ?destination.kind,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::default();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_from_header() {
        assert_eq!(CorrelationId::from_header(Some("req-42")).as_str(), "req-42");
        assert_ne!(CorrelationId::from_header(Some("has space")).as_str(), "has space");
        assert_eq!(CorrelationId::from_header(Some("")).as_str().len(), 36);
        assert_eq!(CorrelationId::from_header(None).as_str().len(), 36);
        let long = "x".repeat(MAX_EXTERNAL_ID_LEN + 1);
        assert_ne!(CorrelationId::from_header(Some(&long)).as_str(), long);
    }
}
