//! # Payment Gate
//!
//! Payment records and the read-only checks the transition guard consults.
//! A shipment is paid when any of its non-deleted payments is COMPLETED.
//!
//! ## Payment status
//!
//! ```text
//! PENDING ──▶ COMPLETED
//!    │            ▲
//!    ▼            │ late capture
//! FAILED ─────────┘
//! ```
//!
//! COMPLETED is terminal. Re-applying the status a payment already has is a
//! no-op, which makes gateway webhook redelivery harmless.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_core::{PackageId, PaymentId, ShipmentId, Timestamp, ValidationError};

use crate::status::ShipmentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Online,
    WireTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "CASH",
            Self::Online => "ONLINE",
            Self::WireTransfer => "WIRE_TRANSFER",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(Self::Cash),
            "ONLINE" => Ok(Self::Online),
            "WIRE_TRANSFER" => Ok(Self::WireTransfer),
            other => Err(ValidationError::UnknownVariant {
                kind: "payment method",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether a payment in this status may move to `next`.
    pub fn can_become(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Completed)
        )
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(ValidationError::UnknownVariant {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment attached to a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub shipment_id: ShipmentId,
    pub package_id: PackageId,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<Timestamp>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub is_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Outcome of applying a status change to a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentUpdate {
    Applied,
    /// The payment already had the requested status.
    Unchanged,
    /// Another payment of the shipment already holds the requested status,
    /// so this one was left as it was.
    Superseded,
}

impl Payment {
    /// Move the payment to `next`, stamping the payment date on completion.
    pub fn set_status(
        &mut self,
        next: PaymentStatus,
        now: Timestamp,
    ) -> Result<PaymentUpdate, PaymentError> {
        if self.payment_status == next {
            return Ok(PaymentUpdate::Unchanged);
        }
        if !self.payment_status.can_become(next) {
            return Err(PaymentError::InvalidStatusChange {
                from: self.payment_status,
                to: next,
            });
        }
        self.payment_status = next;
        if next == PaymentStatus::Completed && self.payment_date.is_none() {
            self.payment_date = Some(now);
        }
        self.updated_at = now;
        Ok(PaymentUpdate::Applied)
    }
}

/// A payment about to be inserted. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub shipment_id: ShipmentId,
    pub package_id: PackageId,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<Timestamp>,
    pub gateway_order_id: Option<String>,
}

impl NewPayment {
    pub fn into_payment(self, id: PaymentId, now: Timestamp) -> Payment {
        let payment_date = match (self.payment_status, self.payment_date) {
            (PaymentStatus::Completed, None) => Some(now),
            (_, date) => date,
        };
        Payment {
            id,
            shipment_id: self.shipment_id,
            package_id: self.package_id,
            payment_method: self.payment_method,
            payment_status: self.payment_status,
            payment_date,
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment can only be made after the supplier accepts the shipment (current status {status})")]
    NotAccepted { status: ShipmentStatus },

    #[error("payment already {status} for this shipment")]
    Duplicate { status: PaymentStatus },

    #[error("payment cannot move from {from} to {to}")]
    InvalidStatusChange { from: PaymentStatus, to: PaymentStatus },

    #[error("new payments must start as PENDING or COMPLETED, got {0}")]
    InvalidInitialStatus(PaymentStatus),
}

fn live(payments: &[Payment]) -> impl Iterator<Item = &Payment> {
    payments.iter().filter(|p| !p.is_deleted)
}

/// Whether any non-deleted payment is COMPLETED.
pub fn is_completed(payments: &[Payment]) -> bool {
    live(payments).any(|p| p.payment_status == PaymentStatus::Completed)
}

pub fn has_pending_payment(payments: &[Payment]) -> bool {
    live(payments).any(|p| p.payment_status == PaymentStatus::Pending)
}

pub fn has_completed_payment(payments: &[Payment]) -> bool {
    is_completed(payments)
}

/// Payment status reported alongside a shipment: COMPLETED if any payment
/// completed, else the newest live payment's status.
pub fn summary_status(payments: &[Payment]) -> Option<PaymentStatus> {
    if is_completed(payments) {
        return Some(PaymentStatus::Completed);
    }
    live(payments)
        .max_by_key(|p| (p.created_at, p.id))
        .map(|p| p.payment_status)
}

/// Check that a new payment may be recorded for a shipment whose current
/// status is `current`.
pub fn check_can_create(
    current: ShipmentStatus,
    existing: &[Payment],
    new: &NewPayment,
) -> Result<(), PaymentError> {
    if new.payment_status == PaymentStatus::Failed {
        return Err(PaymentError::InvalidInitialStatus(new.payment_status));
    }
    if current != ShipmentStatus::Accepted {
        return Err(PaymentError::NotAccepted { status: current });
    }
    if has_pending_payment(existing) {
        return Err(PaymentError::Duplicate {
            status: PaymentStatus::Pending,
        });
    }
    if has_completed_payment(existing) {
        return Err(PaymentError::Duplicate {
            status: PaymentStatus::Completed,
        });
    }
    Ok(())
}

// ── Gateway events ──────────────────────────────────────────────────

/// A payment event reported by the external gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Captured {
        order_id: Option<String>,
        payment_id: String,
    },
    Failed {
        order_id: Option<String>,
        payment_id: String,
    },
}

impl GatewayEvent {
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Captured { order_id, .. } | Self::Failed { order_id, .. } => order_id.as_deref(),
        }
    }

    pub fn payment_id(&self) -> &str {
        match self {
            Self::Captured { payment_id, .. } | Self::Failed { payment_id, .. } => payment_id,
        }
    }

    pub fn target_status(&self) -> PaymentStatus {
        match self {
            Self::Captured { .. } => PaymentStatus::Completed,
            Self::Failed { .. } => PaymentStatus::Failed,
        }
    }

    /// Locate the payment the event refers to: first by gateway payment id,
    /// then by gateway order id. Several payments may share an order id when
    /// a checkout is retried; the order id then binds to a payment that has
    /// not FAILED if there is one, and to the newest among equals.
    pub fn find<'a>(&self, payments: &'a [Payment]) -> Option<&'a Payment> {
        let by_payment = live(payments)
            .find(|p| p.gateway_payment_id.as_deref() == Some(self.payment_id()));
        by_payment.or_else(|| {
            let order_id = self.order_id()?;
            live(payments)
                .filter(|p| p.gateway_order_id.as_deref() == Some(order_id))
                .max_by_key(|p| (p.payment_status != PaymentStatus::Failed, p.created_at, p.id))
        })
    }

    /// Whether another live payment of the same shipment already holds the
    /// status this event would set. A late capture for an abandoned attempt
    /// after a retry completed is the usual case. Such events are not applied.
    pub fn is_superseded(&self, payment: &Payment, payments: &[Payment]) -> bool {
        let target = self.target_status();
        target == PaymentStatus::Completed
            && payment.payment_status != target
            && live(payments).any(|p| {
                p.id != payment.id
                    && p.shipment_id == payment.shipment_id
                    && p.payment_status == target
            })
    }

    /// Apply the event to its payment. Events that would break the payment
    /// status machine (a failure after completion) are ignored.
    pub fn apply(&self, payment: &mut Payment, now: Timestamp) -> PaymentUpdate {
        let target = self.target_status();
        if payment.payment_status != target && !payment.payment_status.can_become(target) {
            return PaymentUpdate::Unchanged;
        }
        let mut changed = false;
        if payment.gateway_payment_id.as_deref() != Some(self.payment_id()) {
            payment.gateway_payment_id = Some(self.payment_id().to_string());
            changed = true;
        }
        if let Ok(PaymentUpdate::Applied) = payment.set_status(target, now) {
            changed = true;
        }
        if changed {
            payment.updated_at = now;
            PaymentUpdate::Applied
        } else {
            PaymentUpdate::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::seconds(secs))
    }

    fn new_payment(status: PaymentStatus) -> NewPayment {
        NewPayment {
            shipment_id: ShipmentId(1),
            package_id: PackageId(1),
            payment_method: PaymentMethod::Online,
            payment_status: status,
            payment_date: None,
            gateway_order_id: Some("order_1".into()),
        }
    }

    fn payment(id: i64, status: PaymentStatus) -> Payment {
        new_payment(status).into_payment(PaymentId(id), at(id))
    }

    #[test]
    fn completed_payment_opens_gate() {
        assert!(!is_completed(&[]));
        assert!(!is_completed(&[payment(1, PaymentStatus::Pending)]));
        assert!(is_completed(&[
            payment(1, PaymentStatus::Failed),
            payment(2, PaymentStatus::Completed)
        ]));
    }

    #[test]
    fn deleted_payments_do_not_count() {
        let mut p = payment(1, PaymentStatus::Completed);
        p.is_deleted = true;
        assert!(!is_completed(&[p]));
    }

    #[test]
    fn creation_requires_accepted_shipment() {
        let err = check_can_create(ShipmentStatus::Pending, &[], &new_payment(PaymentStatus::Pending))
            .unwrap_err();
        assert_eq!(
            err,
            PaymentError::NotAccepted {
                status: ShipmentStatus::Pending
            }
        );
        assert!(check_can_create(ShipmentStatus::Accepted, &[], &new_payment(PaymentStatus::Pending)).is_ok());
    }

    #[test]
    fn duplicate_pending_or_completed_rejected() {
        let pending = [payment(1, PaymentStatus::Pending)];
        assert_eq!(
            check_can_create(ShipmentStatus::Accepted, &pending, &new_payment(PaymentStatus::Pending)),
            Err(PaymentError::Duplicate {
                status: PaymentStatus::Pending
            })
        );
        let done = [payment(1, PaymentStatus::Completed)];
        assert_eq!(
            check_can_create(ShipmentStatus::Accepted, &done, &new_payment(PaymentStatus::Pending)),
            Err(PaymentError::Duplicate {
                status: PaymentStatus::Completed
            })
        );
    }

    #[test]
    fn retry_allowed_after_failure() {
        let failed = [payment(1, PaymentStatus::Failed)];
        assert!(check_can_create(ShipmentStatus::Accepted, &failed, &new_payment(PaymentStatus::Pending)).is_ok());
    }

    #[test]
    fn failed_is_not_an_initial_status() {
        assert!(matches!(
            check_can_create(ShipmentStatus::Accepted, &[], &new_payment(PaymentStatus::Failed)),
            Err(PaymentError::InvalidInitialStatus(_))
        ));
    }

    #[test]
    fn completing_stamps_payment_date() {
        let mut p = payment(1, PaymentStatus::Pending);
        assert_eq!(p.set_status(PaymentStatus::Completed, at(50)), Ok(PaymentUpdate::Applied));
        assert_eq!(p.payment_date, Some(at(50)));
        assert_eq!(p.set_status(PaymentStatus::Completed, at(60)), Ok(PaymentUpdate::Unchanged));
        assert!(p.set_status(PaymentStatus::Failed, at(70)).is_err());
    }

    #[test]
    fn summary_prefers_completed() {
        let ps = [payment(1, PaymentStatus::Completed), payment(2, PaymentStatus::Failed)];
        assert_eq!(summary_status(&ps), Some(PaymentStatus::Completed));
        let ps = [payment(1, PaymentStatus::Failed), payment(2, PaymentStatus::Pending)];
        assert_eq!(summary_status(&ps), Some(PaymentStatus::Pending));
        assert_eq!(summary_status(&[]), None);
    }

    // ── Gateway events ─────────────────────────────────────────────

    #[test]
    fn capture_found_by_order_id_then_payment_id() {
        let mut p = payment(1, PaymentStatus::Pending);
        let event = GatewayEvent::Captured {
            order_id: Some("order_1".into()),
            payment_id: "pay_9".into(),
        };
        assert_eq!(event.find(std::slice::from_ref(&p)).map(|p| p.id), Some(PaymentId(1)));
        assert_eq!(event.apply(&mut p, at(10)), PaymentUpdate::Applied);
        assert_eq!(p.payment_status, PaymentStatus::Completed);
        assert_eq!(p.gateway_payment_id.as_deref(), Some("pay_9"));

        let by_payment_only = GatewayEvent::Captured {
            order_id: None,
            payment_id: "pay_9".into(),
        };
        assert!(by_payment_only.find(std::slice::from_ref(&p)).is_some());
    }

    #[test]
    fn redelivered_capture_is_a_no_op() {
        let mut p = payment(1, PaymentStatus::Pending);
        let event = GatewayEvent::Captured {
            order_id: Some("order_1".into()),
            payment_id: "pay_9".into(),
        };
        assert_eq!(event.apply(&mut p, at(10)), PaymentUpdate::Applied);
        let snapshot = p.clone();
        assert_eq!(event.apply(&mut p, at(20)), PaymentUpdate::Unchanged);
        assert_eq!(p, snapshot);
    }

    #[test]
    fn failure_after_capture_ignored() {
        let mut p = payment(1, PaymentStatus::Completed);
        let event = GatewayEvent::Failed {
            order_id: Some("order_1".into()),
            payment_id: "pay_9".into(),
        };
        assert_eq!(event.apply(&mut p, at(10)), PaymentUpdate::Unchanged);
        assert_eq!(p.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn order_id_prefers_live_attempt_over_failed_one() {
        let failed = payment(1, PaymentStatus::Failed);
        let retry = payment(2, PaymentStatus::Pending);
        let event = GatewayEvent::Captured {
            order_id: Some("order_1".into()),
            payment_id: "pay_2".into(),
        };
        let both = [retry.clone(), failed.clone()];
        assert_eq!(event.find(&both).map(|p| p.id), Some(PaymentId(2)));

        let older_failed = payment(3, PaymentStatus::Failed);
        let newest_failed = payment(4, PaymentStatus::Failed);
        assert_eq!(
            event.find(&[newest_failed, older_failed]).map(|p| p.id),
            Some(PaymentId(4))
        );
    }

    #[test]
    fn gateway_payment_id_wins_over_order_id() {
        let mut bound = payment(1, PaymentStatus::Failed);
        bound.gateway_payment_id = Some("pay_1".into());
        let other = payment(2, PaymentStatus::Pending);
        let event = GatewayEvent::Captured {
            order_id: Some("order_1".into()),
            payment_id: "pay_1".into(),
        };
        assert_eq!(event.find(&[other, bound]).map(|p| p.id), Some(PaymentId(1)));
    }

    #[test]
    fn late_capture_after_completed_retry_is_superseded() {
        let failed = payment(1, PaymentStatus::Failed);
        let retry = payment(2, PaymentStatus::Completed);
        let capture = GatewayEvent::Captured {
            order_id: Some("order_1".into()),
            payment_id: "pay_1".into(),
        };
        let all = [failed.clone(), retry.clone()];
        assert!(capture.is_superseded(&failed, &all));
        assert!(!capture.is_superseded(&retry, &all));

        let failure = GatewayEvent::Failed {
            order_id: Some("order_1".into()),
            payment_id: "pay_1".into(),
        };
        assert!(!failure.is_superseded(&failed, &all));

        let mut deleted = retry;
        deleted.is_deleted = true;
        assert!(!capture.is_superseded(&failed, &[failed.clone(), deleted]));
    }

    #[test]
    fn unknown_event_matches_nothing() {
        let p = payment(1, PaymentStatus::Pending);
        let event = GatewayEvent::Captured {
            order_id: Some("other".into()),
            payment_id: "pay_x".into(),
        };
        assert!(event.find(&[p]).is_none());
    }

    #[test]
    fn enum_names_round_trip() {
        for m in [PaymentMethod::Cash, PaymentMethod::Online, PaymentMethod::WireTransfer] {
            assert_eq!(m.as_str().parse::<PaymentMethod>().unwrap(), m);
        }
        for s in [PaymentStatus::Pending, PaymentStatus::Completed, PaymentStatus::Failed] {
            assert_eq!(s.as_str().parse::<PaymentStatus>().unwrap(), s);
        }
        assert_eq!(
            serde_json::to_string(&PaymentMethod::WireTransfer).unwrap(),
            "\"WIRE_TRANSFER\""
        );
    }
}
