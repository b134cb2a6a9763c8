//! # Transition Guard
//!
//! Pure decision function for shipment status changes. Given the current
//! status, the requested action, the caller, the shipment's parties, and
//! whether payment is complete, the guard either names the status to append
//! or rejects the request.
//!
//! ## Transitions
//!
//! | From                          | To         | Who                                  | Payment  |
//! |-------------------------------|------------|--------------------------------------|----------|
//! | PENDING                       | ACCEPTED   | assigned supplier                    | no       |
//! | PENDING                       | REJECTED   | assigned supplier                    | no       |
//! | ACCEPTED                      | IN_TRANSIT | assigned supplier or super admin     | required |
//! | IN_TRANSIT                    | DELIVERED  | assigned supplier or super admin     | required |
//! | PENDING, ACCEPTED, IN_TRANSIT | CANCELLED  | sender (importer/exporter)           | no       |
//!
//! ## Check order
//!
//! 1. same status as current
//! 2. current status is final
//! 3. structural legality
//! 4. authorization
//! 5. payment
//!
//! The first three depend only on the ledger, so a request that could never
//! succeed is reported as an invalid transition whoever sends it.

use thiserror::Error;

use courier_core::{Caller, Role, UserId};

use crate::action::TransitionAction;
use crate::status::ShipmentStatus;

/// The people attached to a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parties {
    /// The importer/exporter who created the shipment.
    pub sender_id: UserId,
    /// The supplier assigned to carry it.
    pub courier_id: UserId,
}

impl Parties {
    pub fn is_assigned_supplier(&self, caller: &Caller) -> bool {
        caller.is(self.courier_id, Role::Supplier)
    }

    pub fn is_sender(&self, caller: &Caller) -> bool {
        caller.is(self.sender_id, Role::ImporterExporter)
    }

    /// Super admins, the sender, and the assigned supplier may see a shipment.
    pub fn can_view(&self, caller: &Caller) -> bool {
        caller.is_super_admin() || self.is_sender(caller) || self.is_assigned_supplier(caller)
    }

    /// Operational changes (ETA, location annotations) belong to the assigned
    /// supplier and to super admins.
    pub fn can_operate(&self, caller: &Caller) -> bool {
        caller.is_super_admin() || self.is_assigned_supplier(caller)
    }
}

/// Broad category of a rejection, used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    InvalidTransition,
    Unauthorized,
    PaymentRequired,
}

/// A rejected status change or field update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot set the same status twice in a row: shipment is already {status}")]
    SameStatus { status: ShipmentStatus },

    #[error("shipment is in final state {status} and cannot be changed")]
    FinalState { status: ShipmentStatus },

    #[error("invalid transition from {from} to {to}: {reason}")]
    Illegal {
        from: ShipmentStatus,
        to: ShipmentStatus,
        reason: String,
    },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("payment must be completed before the shipment can move to {to}")]
    PaymentRequired { to: ShipmentStatus },
}

impl TransitionError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::SameStatus { .. } | Self::FinalState { .. } | Self::Illegal { .. } => {
                RejectionKind::InvalidTransition
            }
            Self::Unauthorized(_) => RejectionKind::Unauthorized,
            Self::PaymentRequired { .. } => RejectionKind::PaymentRequired,
        }
    }
}

/// Guard over one shipment's current state.
#[derive(Debug, Clone, Copy)]
pub struct TransitionGuard {
    pub current: ShipmentStatus,
    pub parties: Parties,
    pub payment_completed: bool,
}

impl TransitionGuard {
    pub fn new(current: ShipmentStatus, parties: Parties, payment_completed: bool) -> Self {
        Self {
            current,
            parties,
            payment_completed,
        }
    }

    /// Decide whether `caller` may perform `action`. Returns the status to
    /// append on approval.
    pub fn decide(
        &self,
        action: TransitionAction,
        caller: &Caller,
    ) -> Result<ShipmentStatus, TransitionError> {
        let target = action.target();

        if target == self.current {
            return Err(TransitionError::SameStatus {
                status: self.current,
            });
        }
        ensure_mutable(self.current)?;
        if !action.legal_sources().contains(&self.current) {
            return Err(TransitionError::Illegal {
                from: self.current,
                to: target,
                reason: illegal_reason(action),
            });
        }

        self.authorize(action, caller)?;

        if action.requires_payment() && !self.payment_completed {
            return Err(TransitionError::PaymentRequired { to: target });
        }

        Ok(target)
    }

    fn authorize(&self, action: TransitionAction, caller: &Caller) -> Result<(), TransitionError> {
        let allowed = match action {
            TransitionAction::Accept | TransitionAction::Reject => {
                self.parties.is_assigned_supplier(caller)
            }
            TransitionAction::InTransit | TransitionAction::Deliver => {
                self.parties.can_operate(caller)
            }
            TransitionAction::Cancel => self.parties.is_sender(caller),
        };
        if allowed {
            return Ok(());
        }
        let who = match action {
            TransitionAction::Accept | TransitionAction::Reject => "the assigned supplier",
            TransitionAction::InTransit | TransitionAction::Deliver => {
                "the assigned supplier or a super admin"
            }
            TransitionAction::Cancel => "the sender of the shipment",
        };
        Err(TransitionError::Unauthorized(format!(
            "only {who} can {action} this shipment"
        )))
    }

    /// Estimated delivery can change only while the shipment is in transit
    /// and paid for.
    pub fn ensure_eta_editable(&self) -> Result<(), TransitionError> {
        ensure_mutable(self.current)?;
        if self.current != ShipmentStatus::InTransit {
            return Err(TransitionError::Illegal {
                from: self.current,
                to: self.current,
                reason: "estimated delivery can only be updated while IN_TRANSIT".to_string(),
            });
        }
        if !self.payment_completed {
            return Err(TransitionError::PaymentRequired {
                to: ShipmentStatus::InTransit,
            });
        }
        Ok(())
    }
}

/// Reject any field update on a shipment in a final status.
pub fn ensure_mutable(current: ShipmentStatus) -> Result<(), TransitionError> {
    if current.is_final() {
        return Err(TransitionError::FinalState { status: current });
    }
    Ok(())
}

fn illegal_reason(action: TransitionAction) -> String {
    match action {
        TransitionAction::Accept => "can only accept a shipment from PENDING".into(),
        TransitionAction::Reject => "can only reject a shipment from PENDING".into(),
        TransitionAction::InTransit => "can only mark as IN_TRANSIT from ACCEPTED".into(),
        TransitionAction::Deliver => "can only mark as DELIVERED from IN_TRANSIT".into(),
        TransitionAction::Cancel => "shipment can no longer be cancelled".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SENDER: UserId = UserId(10);
    const SUPPLIER: UserId = UserId(20);

    fn parties() -> Parties {
        Parties {
            sender_id: SENDER,
            courier_id: SUPPLIER,
        }
    }

    fn guard(current: ShipmentStatus, paid: bool) -> TransitionGuard {
        TransitionGuard::new(current, parties(), paid)
    }

    fn supplier() -> Caller {
        Caller::new(SUPPLIER, Role::Supplier)
    }

    fn sender() -> Caller {
        Caller::new(SENDER, Role::ImporterExporter)
    }

    fn admin() -> Caller {
        Caller::new(UserId(1), Role::SuperAdmin)
    }

    // ── Happy path ───────────────────────────────────────────────────

    #[test]
    fn supplier_accepts_pending() {
        let to = guard(ShipmentStatus::Pending, false)
            .decide(TransitionAction::Accept, &supplier())
            .unwrap();
        assert_eq!(to, ShipmentStatus::Accepted);
    }

    #[test]
    fn supplier_rejects_pending_without_payment() {
        let to = guard(ShipmentStatus::Pending, false)
            .decide(TransitionAction::Reject, &supplier())
            .unwrap();
        assert_eq!(to, ShipmentStatus::Rejected);
    }

    #[test]
    fn in_transit_requires_payment() {
        let err = guard(ShipmentStatus::Accepted, false)
            .decide(TransitionAction::InTransit, &supplier())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::PaymentRequired {
                to: ShipmentStatus::InTransit
            }
        );
        assert_eq!(err.kind(), RejectionKind::PaymentRequired);

        let to = guard(ShipmentStatus::Accepted, true)
            .decide(TransitionAction::InTransit, &supplier())
            .unwrap();
        assert_eq!(to, ShipmentStatus::InTransit);
    }

    #[test]
    fn super_admin_can_move_and_deliver() {
        assert_eq!(
            guard(ShipmentStatus::Accepted, true)
                .decide(TransitionAction::InTransit, &admin())
                .unwrap(),
            ShipmentStatus::InTransit
        );
        assert_eq!(
            guard(ShipmentStatus::InTransit, true)
                .decide(TransitionAction::Deliver, &admin())
                .unwrap(),
            ShipmentStatus::Delivered
        );
    }

    #[test]
    fn operator_identity_can_move_paid_shipment() {
        let to = guard(ShipmentStatus::Accepted, true)
            .decide(TransitionAction::InTransit, &Caller::operator())
            .unwrap();
        assert_eq!(to, ShipmentStatus::InTransit);
    }

    #[test]
    fn sender_cancels_from_every_open_status() {
        for current in [
            ShipmentStatus::Pending,
            ShipmentStatus::Accepted,
            ShipmentStatus::InTransit,
        ] {
            assert_eq!(
                guard(current, false)
                    .decide(TransitionAction::Cancel, &sender())
                    .unwrap(),
                ShipmentStatus::Cancelled
            );
        }
    }

    // ── Invalid transitions ─────────────────────────────────────────

    #[test]
    fn same_status_rejected_for_everyone() {
        for caller in [supplier(), sender(), admin()] {
            let err = guard(ShipmentStatus::Accepted, true)
                .decide(TransitionAction::Accept, &caller)
                .unwrap_err();
            assert_eq!(
                err,
                TransitionError::SameStatus {
                    status: ShipmentStatus::Accepted
                }
            );
            assert!(err.to_string().contains("same status twice"));
        }
    }

    #[test]
    fn skipping_steps_is_invalid_even_when_paid() {
        for action in [TransitionAction::InTransit, TransitionAction::Deliver] {
            let err = guard(ShipmentStatus::Pending, true)
                .decide(action, &supplier())
                .unwrap_err();
            assert_eq!(err.kind(), RejectionKind::InvalidTransition, "{action}");
        }
    }

    #[test]
    fn reject_only_from_pending() {
        let err = guard(ShipmentStatus::Accepted, false)
            .decide(TransitionAction::Reject, &supplier())
            .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
    }

    #[test]
    fn final_states_are_terminal() {
        for current in [
            ShipmentStatus::Delivered,
            ShipmentStatus::Cancelled,
            ShipmentStatus::Rejected,
            ShipmentStatus::Returned,
        ] {
            for action in TransitionAction::ALL {
                if action.target() == current {
                    continue;
                }
                let err = guard(current, true).decide(action, &admin()).unwrap_err();
                assert_eq!(err, TransitionError::FinalState { status: current });
            }
        }
    }

    #[test]
    fn sender_cannot_cancel_delivered() {
        let err = guard(ShipmentStatus::Delivered, true)
            .decide(TransitionAction::Cancel, &sender())
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::InvalidTransition);
    }

    // ── Authorization ───────────────────────────────────────────────

    #[test]
    fn other_supplier_cannot_accept() {
        let other = Caller::new(UserId(99), Role::Supplier);
        let err = guard(ShipmentStatus::Pending, false)
            .decide(TransitionAction::Accept, &other)
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::Unauthorized);
    }

    #[test]
    fn super_admin_cannot_accept_on_behalf_of_supplier() {
        let err = guard(ShipmentStatus::Pending, false)
            .decide(TransitionAction::Accept, &admin())
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::Unauthorized);
    }

    #[test]
    fn supplier_cannot_cancel() {
        let err = guard(ShipmentStatus::Pending, false)
            .decide(TransitionAction::Cancel, &supplier())
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::Unauthorized);
    }

    #[test]
    fn sender_cannot_move_in_transit() {
        let err = guard(ShipmentStatus::Accepted, true)
            .decide(TransitionAction::InTransit, &sender())
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::Unauthorized);
    }

    #[test]
    fn authorization_checked_before_payment() {
        let err = guard(ShipmentStatus::Accepted, false)
            .decide(TransitionAction::InTransit, &sender())
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::Unauthorized);
    }

    // ── Field updates ───────────────────────────────────────────────

    #[test]
    fn eta_editable_only_in_transit_and_paid() {
        assert!(guard(ShipmentStatus::InTransit, true).ensure_eta_editable().is_ok());
        assert_eq!(
            guard(ShipmentStatus::InTransit, false)
                .ensure_eta_editable()
                .unwrap_err()
                .kind(),
            RejectionKind::PaymentRequired
        );
        assert!(matches!(
            guard(ShipmentStatus::Accepted, true).ensure_eta_editable(),
            Err(TransitionError::Illegal { .. })
        ));
        assert!(matches!(
            guard(ShipmentStatus::Delivered, true).ensure_eta_editable(),
            Err(TransitionError::FinalState { .. })
        ));
    }

    #[test]
    fn ensure_mutable_rejects_final_states() {
        for status in ShipmentStatus::ALL {
            assert_eq!(ensure_mutable(status).is_err(), status.is_final());
        }
    }

    // ── Properties ──────────────────────────────────────────────────

    fn any_status() -> impl Strategy<Value = ShipmentStatus> {
        prop::sample::select(ShipmentStatus::ALL.to_vec())
    }

    fn any_action() -> impl Strategy<Value = TransitionAction> {
        prop::sample::select(TransitionAction::ALL.to_vec())
    }

    fn any_caller() -> impl Strategy<Value = Caller> {
        prop_oneof![
            Just(supplier()),
            Just(sender()),
            Just(admin()),
            Just(Caller::operator()),
            Just(Caller::new(UserId(77), Role::Supplier)),
            Just(Caller::new(UserId(78), Role::ImporterExporter)),
        ]
    }

    proptest! {
        #[test]
        fn approvals_never_repeat_or_leave_final_states(
            current in any_status(),
            action in any_action(),
            caller in any_caller(),
            paid in any::<bool>(),
        ) {
            if let Ok(to) = guard(current, paid).decide(action, &caller) {
                prop_assert_ne!(to, current);
                prop_assert!(!current.is_final());
                prop_assert!(action.legal_sources().contains(&current));
                if action.requires_payment() {
                    prop_assert!(paid);
                }
            }
        }

        #[test]
        fn ledger_only_rejections_ignore_caller(
            current in any_status(),
            action in any_action(),
            a in any_caller(),
            b in any_caller(),
            paid in any::<bool>(),
        ) {
            let ra = guard(current, paid).decide(action, &a);
            let rb = guard(current, paid).decide(action, &b);
            if let Err(e) = &ra {
                if e.kind() == RejectionKind::InvalidTransition {
                    prop_assert_eq!(&ra, &rb);
                }
            }
        }
    }
}
