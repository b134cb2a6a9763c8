//! Requested lifecycle actions and the status each one targets.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use courier_core::ValidationError;

use crate::status::ShipmentStatus;

/// An action a caller asks to perform on a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Accept,
    Reject,
    InTransit,
    Deliver,
    Cancel,
}

impl TransitionAction {
    pub const ALL: [TransitionAction; 5] = [
        Self::Accept,
        Self::Reject,
        Self::InTransit,
        Self::Deliver,
        Self::Cancel,
    ];

    /// The status appended to the ledger when the action is approved.
    pub fn target(&self) -> ShipmentStatus {
        match self {
            Self::Accept => ShipmentStatus::Accepted,
            Self::Reject => ShipmentStatus::Rejected,
            Self::InTransit => ShipmentStatus::InTransit,
            Self::Deliver => ShipmentStatus::Delivered,
            Self::Cancel => ShipmentStatus::Cancelled,
        }
    }

    /// Statuses from which the action is structurally legal.
    pub fn legal_sources(&self) -> &'static [ShipmentStatus] {
        match self {
            Self::Accept | Self::Reject => &[ShipmentStatus::Pending],
            Self::InTransit => &[ShipmentStatus::Accepted],
            Self::Deliver => &[ShipmentStatus::InTransit],
            Self::Cancel => &[
                ShipmentStatus::Pending,
                ShipmentStatus::Accepted,
                ShipmentStatus::InTransit,
            ],
        }
    }

    /// Whether the payment gate applies to this action.
    pub fn requires_payment(&self) -> bool {
        matches!(self, Self::InTransit | Self::Deliver)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::InTransit => "in_transit",
            Self::Deliver => "deliver",
            Self::Cancel => "cancel",
        }
    }

    /// The action that leads to `status`, if any does.
    pub fn for_target(status: ShipmentStatus) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.target() == status)
    }
}

/// Accepts the verb and past-participle spellings used by clients
/// (`accept`/`accepted`, `deliver`/`delivered`, ...), case-insensitively.
impl FromStr for TransitionAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" | "accepted" => Ok(Self::Accept),
            "reject" | "rejected" => Ok(Self::Reject),
            "in_transit" | "in-transit" | "ship" => Ok(Self::InTransit),
            "deliver" | "delivered" => Ok(Self::Deliver),
            "cancel" | "cancelled" | "canceled" => Ok(Self::Cancel),
            _ => Err(ValidationError::UnknownVariant {
                kind: "action",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_parse() {
        assert_eq!("accepted".parse::<TransitionAction>().unwrap(), TransitionAction::Accept);
        assert_eq!("REJECT".parse::<TransitionAction>().unwrap(), TransitionAction::Reject);
        assert_eq!("cancelled".parse::<TransitionAction>().unwrap(), TransitionAction::Cancel);
        assert_eq!("IN_TRANSIT".parse::<TransitionAction>().unwrap(), TransitionAction::InTransit);
        assert_eq!("delivered".parse::<TransitionAction>().unwrap(), TransitionAction::Deliver);
    }

    #[test]
    fn unknown_action_rejected() {
        assert!("return".parse::<TransitionAction>().is_err());
    }

    #[test]
    fn every_action_targets_a_distinct_status() {
        let mut targets: Vec<_> = TransitionAction::ALL.iter().map(|a| a.target()).collect();
        targets.dedup();
        assert_eq!(targets.len(), TransitionAction::ALL.len());
    }

    #[test]
    fn returned_has_no_action() {
        assert_eq!(TransitionAction::for_target(ShipmentStatus::Returned), None);
        assert_eq!(TransitionAction::for_target(ShipmentStatus::Pending), None);
        assert_eq!(
            TransitionAction::for_target(ShipmentStatus::Delivered),
            Some(TransitionAction::Deliver)
        );
    }

    #[test]
    fn only_pipeline_moves_need_payment() {
        let gated: Vec<_> = TransitionAction::ALL
            .into_iter()
            .filter(TransitionAction::requires_payment)
            .collect();
        assert_eq!(gated, vec![TransitionAction::InTransit, TransitionAction::Deliver]);
    }
}
