//! Typed errors for the synchronization layer.
//!
//! Two layers of error exist. [`GwError`] covers local failures (timeouts,
//! codec problems, closed subscriptions). [`CodeMsg`] is the gateway's own
//! `(code, message)` pair carried on error events; [`classify`] folds its
//! large code space into a small [`GatewayErrorKind`] so callers can match on
//! meaning instead of raw codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the synchronization layer itself.
#[derive(Debug, Error)]
pub enum GwError {
    /// A blocking wait exceeded its deadline.
    #[error("timed out waiting for gateway response")]
    Timeout,

    /// The subscription's publisher side is gone.
    #[error("subscription closed")]
    SubscriptionClosed,

    /// Frame or payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A frame did not have the `tag::payload` shape.
    #[error("malformed frame: {0}")]
    BadFrame(String),

    /// A gateway timestamp string matched none of the known formats.
    #[error("unparseable gateway timestamp: {0:?}")]
    BadTimestamp(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The gateway reported an error for a request.
    #[error("gateway error {code}: {message}")]
    Gateway { code: i64, message: String },
}

impl GwError {
    pub fn from_code_msg(cm: &CodeMsg) -> Self {
        Self::Gateway {
            code: cm.code,
            message: cm.message.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway (code, message) pairs
// ---------------------------------------------------------------------------

/// A gateway error or warning event as delivered on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMsg {
    pub code: i64,
    pub message: String,
}

impl CodeMsg {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// True when the code is informational rather than a request failure.
    pub fn is_warning(&self) -> bool {
        is_warning_code(self.code)
    }
}

impl std::fmt::Display for CodeMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Codes the gateway sends on the error channel that are status notices, not
/// failures. They must not fail a pending request.
pub fn is_warning_code(code: i64) -> bool {
    matches!(
        code,
        161 | 202 | 2104 | 2106 | 2107 | 2108 | 2119 | 2158 | 10167 | 10197
    )
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Canonical meaning of a gateway error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Contract description matched more than one instrument.
    AmbiguousContract,
    /// Contract description matched nothing.
    NoSecurityDefinition,
    /// The API connection is down or was never established.
    NotConnected,
    /// Connectivity between the gateway and the broker was lost.
    ConnectionLost,
    /// Market data is not subscribed for this instrument.
    MarketDataNotSubscribed,
    /// The historical data service rejected or aborted the request.
    HistoricalDataError,
    /// The request failed validation before reaching the broker.
    Validation,
    /// The order was rejected or cancelled by the destination.
    OrderRejected,
    /// Informational notice (see [`is_warning_code`]).
    Warning,
    /// Anything else.
    Other,
}

/// Fold a gateway code into its canonical kind. Message text participates
/// only for code 200, which is shared by two distinct conditions.
pub fn classify(code: i64, message: &str) -> GatewayErrorKind {
    if is_warning_code(code) {
        return GatewayErrorKind::Warning;
    }
    match code {
        200 => {
            if message.contains("ambiguous") || message.contains("Ambiguous") {
                GatewayErrorKind::AmbiguousContract
            } else {
                GatewayErrorKind::NoSecurityDefinition
            }
        }
        162 | 165 | 366 => GatewayErrorKind::HistoricalDataError,
        201 | 203 => GatewayErrorKind::OrderRejected,
        321 | 322 | 478 => GatewayErrorKind::Validation,
        354 | 10089 | 10090 => GatewayErrorKind::MarketDataNotSubscribed,
        502 | 504 | 522 => GatewayErrorKind::NotConnected,
        1100 | 1300 | 2110 => GatewayErrorKind::ConnectionLost,
        _ => GatewayErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_codes_never_classify_as_failures() {
        for code in [161, 202, 2104, 2106, 2107, 2108, 2119, 2158, 10167, 10197] {
            assert!(is_warning_code(code), "{code} should be a warning");
            assert_eq!(classify(code, ""), GatewayErrorKind::Warning);
        }
        assert!(!is_warning_code(200));
    }

    #[test]
    fn code_200_splits_on_message() {
        assert_eq!(
            classify(200, "The contract description specified for AAPL is ambiguous."),
            GatewayErrorKind::AmbiguousContract
        );
        assert_eq!(
            classify(200, "No security definition has been found for the request"),
            GatewayErrorKind::NoSecurityDefinition
        );
    }

    #[test]
    fn gateway_error_carries_code_and_message() {
        let cm = CodeMsg::new(321, "Error validating request");
        let err = GwError::from_code_msg(&cm);
        assert_eq!(
            err.to_string(),
            "gateway error 321: Error validating request"
        );
    }
}
