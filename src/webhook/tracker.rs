/// Current status per shipment, fed by normalized webhook events.
///
/// Transitions only move forward and terminal states absorb everything, so
/// out-of-order or redelivered webhooks can never resurrect a delivered or
/// cancelled shipment. Terminal shipments drop their redelivery history, and
/// only the most recent `terminal_capacity` of them are remembered.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::models::provider::ProviderId;
use crate::models::shipment::ShipmentStatus;
use crate::models::webhook::WebhookEvent;

const DEFAULT_TERMINAL_CAPACITY: usize = 10_000;

/// What `apply` did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied {
        from: Option<ShipmentStatus>,
        to: ShipmentStatus,
    },
    /// Same status and timestamp already seen.
    Duplicate,
    /// The shipment is already terminal.
    IgnoredTerminal { current: ShipmentStatus },
    /// The event would move the shipment backwards.
    IgnoredBackward {
        current: ShipmentStatus,
        proposed: ShipmentStatus,
    },
}

#[derive(Debug, Default)]
struct TrackedShipment {
    status: Option<ShipmentStatus>,
    seen: HashSet<(ShipmentStatus, DateTime<Utc>)>,
}

impl TrackedShipment {
    fn is_terminal(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }
}

type ShipmentKey = (ProviderId, String);

#[derive(Debug, Default)]
struct Shipments {
    tracked: HashMap<ShipmentKey, TrackedShipment>,
    /// Terminal shipments, oldest first.
    terminal: VecDeque<ShipmentKey>,
}

#[derive(Debug)]
pub struct ShipmentStatusTracker {
    shipments: Mutex<Shipments>,
    terminal_capacity: usize,
}

impl Default for ShipmentStatusTracker {
    fn default() -> Self {
        Self::with_terminal_capacity(DEFAULT_TERMINAL_CAPACITY)
    }
}

impl ShipmentStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terminal_capacity(terminal_capacity: usize) -> Self {
        ShipmentStatusTracker {
            shipments: Mutex::new(Shipments::default()),
            terminal_capacity,
        }
    }

    fn with_shipments<R>(&self, f: impl FnOnce(&mut Shipments) -> R) -> R {
        let mut guard = self.shipments.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Starts tracking a freshly created shipment.
    pub fn register(&self, provider_id: &ProviderId, tracking_number: &str, status: ShipmentStatus) {
        self.with_shipments(|shipments| {
            let tracked = shipments
                .tracked
                .entry((provider_id.clone(), tracking_number.to_string()))
                .or_default();
            if tracked.status.is_none() {
                tracked.status = Some(status);
            }
        });
    }

    pub fn status(&self, provider_id: &ProviderId, tracking_number: &str) -> Option<ShipmentStatus> {
        self.with_shipments(|shipments| {
            shipments
                .tracked
                .get(&(provider_id.clone(), tracking_number.to_string()))
                .and_then(|t| t.status)
        })
    }

    /// Applies a webhook event, dropping redeliveries of an already seen
    /// `(status, timestamp)` pair.
    pub fn apply(&self, event: &WebhookEvent) -> TransitionOutcome {
        let fresh = self.with_shipments(|shipments| {
            let tracked = shipments
                .tracked
                .entry((event.provider_id.clone(), event.tracking_number.clone()))
                .or_default();
            // Terminal shipments ignore everything, so their history is not kept.
            tracked.is_terminal() || tracked.seen.insert((event.status, event.timestamp))
        });
        if !fresh {
            return TransitionOutcome::Duplicate;
        }
        self.advance(&event.provider_id, &event.tracking_number, event.status)
    }

    /// Moves a shipment to `next` if the transition is allowed.
    pub fn advance(&self, provider_id: &ProviderId, tracking_number: &str, next: ShipmentStatus) -> TransitionOutcome {
        let capacity = self.terminal_capacity;
        let outcome = self.with_shipments(|shipments| {
            let key = (provider_id.clone(), tracking_number.to_string());
            let tracked = shipments.tracked.entry(key.clone()).or_default();
            let outcome = match tracked.status {
                Some(current) if current.is_terminal() => TransitionOutcome::IgnoredTerminal { current },
                Some(current) if !current.can_transition_to(next) => TransitionOutcome::IgnoredBackward {
                    current,
                    proposed: next,
                },
                from => {
                    tracked.status = Some(next);
                    TransitionOutcome::Applied { from, to: next }
                }
            };
            if matches!(outcome, TransitionOutcome::Applied { .. }) && next.is_terminal() {
                tracked.seen = HashSet::new();
                shipments.terminal.push_back(key);
                while shipments.terminal.len() > capacity {
                    if let Some(oldest) = shipments.terminal.pop_front() {
                        shipments.tracked.remove(&oldest);
                    }
                }
            }
            outcome
        });
        if !matches!(outcome, TransitionOutcome::Applied { .. }) {
            tracing::info!(
                provider_id = %provider_id,
                tracking_number,
                outcome = ?outcome,
                "status transition not applied"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(status: ShipmentStatus, minute: u32) -> WebhookEvent {
        WebhookEvent {
            provider_id: ProviderId::from("swiftship"),
            tracking_number: "SS1".to_string(),
            status,
            provider_status: status.to_string(),
            location: None,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 2, 8, minute, 0).unwrap(),
            description: None,
            raw_provider_payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_forward_progress_with_skips() {
        let tracker = ShipmentStatusTracker::new();
        tracker.register(&ProviderId::from("swiftship"), "SS1", ShipmentStatus::Created);
        assert_eq!(
            tracker.apply(&event(ShipmentStatus::InTransit, 1)),
            TransitionOutcome::Applied {
                from: Some(ShipmentStatus::Created),
                to: ShipmentStatus::InTransit
            }
        );
        assert!(matches!(
            tracker.apply(&event(ShipmentStatus::PickedUp, 2)),
            TransitionOutcome::IgnoredBackward { .. }
        ));
        assert_eq!(
            tracker.status(&ProviderId::from("swiftship"), "SS1"),
            Some(ShipmentStatus::InTransit)
        );
    }

    #[test]
    fn test_terminal_state_absorbs_everything() {
        let tracker = ShipmentStatusTracker::new();
        tracker.apply(&event(ShipmentStatus::Delivered, 5));
        for (i, status) in [
            ShipmentStatus::InTransit,
            ShipmentStatus::Cancelled,
            ShipmentStatus::Returned,
            ShipmentStatus::OutForDelivery,
        ]
        .into_iter()
        .enumerate()
        {
            assert_eq!(
                tracker.apply(&event(status, 10 + i as u32)),
                TransitionOutcome::IgnoredTerminal {
                    current: ShipmentStatus::Delivered
                }
            );
        }
        assert_eq!(
            tracker.status(&ProviderId::from("swiftship"), "SS1"),
            Some(ShipmentStatus::Delivered)
        );
    }

    #[test]
    fn test_redelivery_is_a_duplicate() {
        let tracker = ShipmentStatusTracker::new();
        let e = event(ShipmentStatus::OutForDelivery, 3);
        assert!(matches!(tracker.apply(&e), TransitionOutcome::Applied { from: None, .. }));
        assert_eq!(tracker.apply(&e), TransitionOutcome::Duplicate);
    }

    #[test]
    fn test_terminal_shipments_are_pruned() {
        let tracker = ShipmentStatusTracker::with_terminal_capacity(2);
        let carrier = ProviderId::from("swiftship");
        for awb in ["SS1", "SS2", "SS3"] {
            tracker.register(&carrier, awb, ShipmentStatus::Created);
        }
        tracker.apply(&event(ShipmentStatus::InTransit, 1));
        tracker.apply(&event(ShipmentStatus::Delivered, 2));
        tracker.apply(&event(ShipmentStatus::InTransit, 3));
        tracker.with_shipments(|shipments| {
            let ss1 = &shipments.tracked[&(carrier.clone(), "SS1".to_string())];
            assert!(ss1.seen.is_empty());
        });

        tracker.advance(&carrier, "SS2", ShipmentStatus::Cancelled);
        tracker.advance(&carrier, "SS3", ShipmentStatus::Delivered);
        assert_eq!(tracker.status(&carrier, "SS1"), None);
        assert_eq!(tracker.status(&carrier, "SS2"), Some(ShipmentStatus::Cancelled));
        assert_eq!(tracker.status(&carrier, "SS3"), Some(ShipmentStatus::Delivered));
        tracker.with_shipments(|shipments| {
            assert_eq!(shipments.tracked.len(), 2);
            assert_eq!(shipments.terminal.len(), 2);
        });
    }
}
