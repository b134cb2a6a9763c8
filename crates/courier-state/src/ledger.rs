//! # Status Ledger
//!
//! Append-only log of status events per shipment. The current status of a
//! shipment is never stored on the shipment itself; it is derived from the
//! ledger as the non-deleted event with the greatest `(created_at, id)`.
//!
//! Events are immutable once written apart from their annotation fields
//! (`current_location`, `is_delivered`), which may be patched on the latest
//! event without touching its status.

use serde::{Deserialize, Serialize};

use courier_core::{PackageId, ShipmentId, StatusEventId, Timestamp};

use crate::status::ShipmentStatus;

/// One row of the status ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: StatusEventId,
    pub shipment_id: ShipmentId,
    pub package_id: PackageId,
    pub status: ShipmentStatus,
    pub current_location: Option<String>,
    pub is_delivered: bool,
    pub is_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StatusEvent {
    /// Ordering key of the ledger. Ids break ties between events created in
    /// the same microsecond.
    pub fn ledger_key(&self) -> (Timestamp, StatusEventId) {
        (self.created_at, self.id)
    }
}

/// An event about to be appended. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatusEvent {
    pub shipment_id: ShipmentId,
    pub package_id: PackageId,
    pub status: ShipmentStatus,
    pub current_location: Option<String>,
    pub is_delivered: bool,
}

impl NewStatusEvent {
    /// The PENDING event every shipment starts with.
    pub fn initial(shipment_id: ShipmentId, package_id: PackageId) -> Self {
        Self::transition(shipment_id, package_id, ShipmentStatus::Pending)
    }

    /// An event recording a guarded transition to `status`.
    pub fn transition(shipment_id: ShipmentId, package_id: PackageId, status: ShipmentStatus) -> Self {
        Self {
            shipment_id,
            package_id,
            status,
            current_location: None,
            is_delivered: status == ShipmentStatus::Delivered,
        }
    }

    pub fn into_event(self, id: StatusEventId, now: Timestamp) -> StatusEvent {
        StatusEvent {
            id,
            shipment_id: self.shipment_id,
            package_id: self.package_id,
            status: self.status,
            current_location: self.current_location,
            is_delivered: self.is_delivered,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Patch for the annotation fields of the latest event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub current_location: Option<String>,
    pub is_delivered: Option<bool>,
}

impl EventAnnotation {
    pub fn is_empty(&self) -> bool {
        self.current_location.is_none() && self.is_delivered.is_none()
    }

    /// Apply the patch. Leaves `status` and `created_at` untouched.
    pub fn apply(&self, event: &mut StatusEvent, now: Timestamp) {
        if let Some(location) = &self.current_location {
            event.current_location = Some(location.clone());
        }
        if let Some(delivered) = self.is_delivered {
            event.is_delivered = delivered;
        }
        event.updated_at = now;
    }
}

/// Timeline item shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: ShipmentStatus,
    pub timestamp: Timestamp,
    pub priority: u8,
}

/// The authoritative current event: non-deleted, greatest `(created_at, id)`.
pub fn current(events: &[StatusEvent]) -> Option<&StatusEvent> {
    events
        .iter()
        .filter(|e| !e.is_deleted)
        .max_by_key(|e| e.ledger_key())
}

/// Non-deleted events, newest first.
pub fn history(events: &[StatusEvent]) -> Vec<StatusEvent> {
    let mut live: Vec<StatusEvent> = events.iter().filter(|e| !e.is_deleted).cloned().collect();
    live.sort_by_key(|e| std::cmp::Reverse(e.ledger_key()));
    live
}

/// History normalised for display: ascending pipeline priority, stable on
/// the newest-first order for equal priorities.
pub fn timeline(events: &[StatusEvent]) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = history(events)
        .into_iter()
        .map(|e| TimelineEntry {
            status: e.status,
            timestamp: e.created_at,
            priority: e.status.priority(),
        })
        .collect();
    entries.sort_by_key(|e| e.priority);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap() + Duration::seconds(secs))
    }

    fn event(id: i64, status: ShipmentStatus, secs: i64) -> StatusEvent {
        NewStatusEvent::transition(ShipmentId(1), PackageId(1), status)
            .into_event(StatusEventId(id), at(secs))
    }

    #[test]
    fn current_is_latest_by_created_at() {
        let events = vec![
            event(1, ShipmentStatus::Pending, 0),
            event(3, ShipmentStatus::InTransit, 20),
            event(2, ShipmentStatus::Accepted, 10),
        ];
        assert_eq!(current(&events).unwrap().status, ShipmentStatus::InTransit);
    }

    #[test]
    fn ties_broken_by_id() {
        let events = vec![
            event(5, ShipmentStatus::Accepted, 10),
            event(4, ShipmentStatus::Pending, 10),
        ];
        assert_eq!(current(&events).unwrap().id, StatusEventId(5));
    }

    #[test]
    fn deleted_events_are_ignored() {
        let mut latest = event(2, ShipmentStatus::Accepted, 10);
        latest.is_deleted = true;
        let events = vec![event(1, ShipmentStatus::Pending, 0), latest];
        assert_eq!(current(&events).unwrap().status, ShipmentStatus::Pending);
        assert_eq!(history(&events).len(), 1);
    }

    #[test]
    fn empty_ledger_has_no_current() {
        assert!(current(&[]).is_none());
        assert!(timeline(&[]).is_empty());
    }

    #[test]
    fn history_is_newest_first() {
        let events = vec![
            event(1, ShipmentStatus::Pending, 0),
            event(2, ShipmentStatus::Accepted, 10),
            event(3, ShipmentStatus::Cancelled, 20),
        ];
        let ids: Vec<_> = history(&events).iter().map(|e| e.id.get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn timeline_orders_by_priority() {
        let events = vec![
            event(1, ShipmentStatus::Pending, 0),
            event(2, ShipmentStatus::Accepted, 10),
            event(3, ShipmentStatus::InTransit, 20),
            event(4, ShipmentStatus::Delivered, 30),
        ];
        let entries = timeline(&events);
        let statuses: Vec<_> = entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                ShipmentStatus::Pending,
                ShipmentStatus::Accepted,
                ShipmentStatus::InTransit,
                ShipmentStatus::Delivered,
            ]
        );
        assert_eq!(entries[3].priority, 4);
        assert_eq!(entries[0].timestamp, at(0));
    }

    #[test]
    fn escape_statuses_lead_the_timeline() {
        let events = vec![
            event(1, ShipmentStatus::Pending, 0),
            event(2, ShipmentStatus::Accepted, 10),
            event(3, ShipmentStatus::Cancelled, 20),
        ];
        let entries = timeline(&events);
        assert_eq!(entries[0].status, ShipmentStatus::Cancelled);
        assert_eq!(entries[0].priority, 0);
    }

    #[test]
    fn delivered_event_sets_delivered_flag() {
        assert!(event(1, ShipmentStatus::Delivered, 0).is_delivered);
        assert!(!event(1, ShipmentStatus::InTransit, 0).is_delivered);
    }

    #[test]
    fn annotation_preserves_status_and_creation_time() {
        let mut e = event(1, ShipmentStatus::InTransit, 0);
        let patch = EventAnnotation {
            current_location: Some("Hub 4".into()),
            is_delivered: None,
        };
        patch.apply(&mut e, at(60));
        assert_eq!(e.status, ShipmentStatus::InTransit);
        assert_eq!(e.created_at, at(0));
        assert_eq!(e.updated_at, at(60));
        assert_eq!(e.current_location.as_deref(), Some("Hub 4"));
        assert!(!patch.is_empty());
        assert!(EventAnnotation::default().is_empty());
    }

    proptest! {
        #[test]
        fn current_matches_max_key(
            rows in prop::collection::vec((0i64..50, any::<bool>()), 1..20)
        ) {
            let events: Vec<StatusEvent> = rows
                .iter()
                .enumerate()
                .map(|(i, (secs, deleted))| {
                    let mut e = event(i as i64 + 1, ShipmentStatus::Pending, *secs);
                    e.is_deleted = *deleted;
                    e
                })
                .collect();
            let expected = events
                .iter()
                .filter(|e| !e.is_deleted)
                .map(|e| (e.created_at, e.id))
                .max();
            prop_assert_eq!(current(&events).map(|e| e.ledger_key()), expected);
            prop_assert_eq!(
                history(&events).first().map(|e| e.ledger_key()),
                expected
            );
        }
    }
}
