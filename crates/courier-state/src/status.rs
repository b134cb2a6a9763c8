//! # Shipment Status
//!
//! ```text
//! PENDING ──▶ ACCEPTED ──▶ IN_TRANSIT ──▶ DELIVERED
//!    │           │             │
//!    │           └─────────────┴──────▶ CANCELLED
//!    ├──────────────────────────────────▶ CANCELLED
//!    └──▶ REJECTED
//!
//! RETURNED: terminal, no guarded entry.
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use courier_core::ValidationError;

/// Lifecycle status of a shipment as recorded in the status ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    Accepted,
    InTransit,
    Delivered,
    Cancelled,
    Returned,
    Rejected,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 7] = [
        Self::Pending,
        Self::Accepted,
        Self::InTransit,
        Self::Delivered,
        Self::Cancelled,
        Self::Returned,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::InTransit => "IN_TRANSIT",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Returned => "RETURNED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Final statuses accept no further transitions and freeze every
    /// shipment field.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Cancelled | Self::Rejected | Self::Returned
        )
    }

    /// Position on the delivery pipeline used to order the timeline.
    /// Escape statuses rank 0.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Pending => 1,
            Self::Accepted => 2,
            Self::InTransit => 3,
            Self::Delivered => 4,
            Self::Cancelled | Self::Returned | Self::Rejected => 0,
        }
    }
}

impl FromStr for ShipmentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "shipment status",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
