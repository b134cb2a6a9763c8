//! # Error Types
//!
//! Errors raised while constructing core values. All errors use `thiserror`
//! for derive-based `Display` and `Error` implementations.

use thiserror::Error;

/// Validation failure for a core primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field was empty or whitespace.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A numeric identifier was zero or negative.
    #[error("{kind} id must be positive, got {value}")]
    NonPositiveId {
        /// Identifier namespace ("shipment", "package", ...).
        kind: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// Tracking number does not carry the `SHPMNT_` prefix.
    #[error("invalid tracking number: {0:?}")]
    InvalidTrackingNumber(String),

    /// Role string not recognised.
    #[error("unknown role: {0:?}")]
    UnknownRole(String),

    /// Timestamp string could not be parsed as RFC 3339.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// A name did not match any variant of a domain enum.
    #[error("unknown {kind}: {value:?}")]
    UnknownVariant {
        /// Enum being parsed ("shipment status", "payment method", ...).
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A measurement or amount was out of range.
    #[error("{field} must be greater than zero")]
    NotPositive {
        /// Name of the offending field.
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_message_names_field() {
        let err = ValidationError::EmptyField { field: "recipient_name" };
        assert_eq!(err.to_string(), "recipient_name must not be empty");
    }

    #[test]
    fn unknown_variant_message() {
        let err = ValidationError::UnknownVariant {
            kind: "shipment status",
            value: "LOST".into(),
        };
        assert!(err.to_string().contains("shipment status"));
        assert!(err.to_string().contains("LOST"));
    }
}
