//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers of the courier domain. Row ids are
//! database-assigned `i64` values; the wrappers keep namespaces apart so a
//! `PackageId` cannot be passed where a `ShipmentId` is expected.
//!
//! Ids are ordered. The status ledger relies on that ordering to break ties
//! between events created in the same instant.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw id, rejecting zero and negative values.
            pub fn new(value: i64) -> Result<Self, ValidationError> {
                if value <= 0 {
                    return Err(ValidationError::NonPositiveId { kind: $kind, value });
                }
                Ok(Self(value))
            }

            /// The raw database value.
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

row_id!(
    /// Identifier of a shipment.
    ShipmentId,
    "shipment"
);
row_id!(
    /// Identifier of a package.
    PackageId,
    "package"
);
row_id!(
    /// Identifier of a payment.
    PaymentId,
    "payment"
);
row_id!(
    /// Identifier of a row in the status ledger.
    StatusEventId,
    "status event"
);
row_id!(
    /// Identifier of a user (sender, supplier, or administrator).
    UserId,
    "user"
);

/// Prefix carried by every tracking number.
pub const TRACKING_PREFIX: &str = "SHPMNT_";

/// Public tracking number of a shipment: `SHPMNT_` followed by an
/// upper-case, hyphen-free UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingNumber(String);

impl TrackingNumber {
    /// Generate a fresh tracking number.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!("{TRACKING_PREFIX}{suffix}"))
    }

    /// Validate an existing tracking number.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.strip_prefix(TRACKING_PREFIX) {
            Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(Self(s.to_string()))
            }
            _ => Err(ValidationError::InvalidTrackingNumber(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TrackingNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TrackingNumber> for String {
    fn from(t: TrackingNumber) -> String {
        t.0
    }
}

impl std::fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_non_positive_values() {
        assert!(ShipmentId::new(0).is_err());
        assert!(PaymentId::new(-4).is_err());
        assert_eq!(PackageId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&StatusEventId(42)).unwrap();
        assert_eq!(json, "42");
        let back: UserId = serde_json::from_str("9").unwrap();
        assert_eq!(back, UserId(9));
    }

    #[test]
    fn ids_order_numerically() {
        assert!(StatusEventId(2) > StatusEventId(1));
    }

    #[test]
    fn generated_tracking_number_parses() {
        let t = TrackingNumber::generate();
        assert!(t.as_str().starts_with("SHPMNT_"));
        assert_eq!(t.as_str().len(), TRACKING_PREFIX.len() + 32);
        assert_eq!(TrackingNumber::parse(t.as_str()).unwrap(), t);
    }

    #[test]
    fn tracking_numbers_are_unique() {
        assert_ne!(TrackingNumber::generate(), TrackingNumber::generate());
    }

    #[test]
    fn tracking_number_rejects_wrong_prefix() {
        assert!(TrackingNumber::parse("PKG_123").is_err());
        assert!(TrackingNumber::parse("SHPMNT_").is_err());
        assert!(TrackingNumber::parse("SHPMNT_AB-CD").is_err());
    }

    #[test]
    fn tracking_number_deserialization_validates() {
        let ok: Result<TrackingNumber, _> = serde_json::from_str("\"SHPMNT_ABC123\"");
        assert!(ok.is_ok());
        let bad: Result<TrackingNumber, _> = serde_json::from_str("\"ABC123\"");
        assert!(bad.is_err());
    }
}
