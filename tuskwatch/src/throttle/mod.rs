//! Notification throttle for suppressing repeated alerts.
//!
//! An animal pacing along a fence line crosses it over and over. Each
//! crossing is a real transition, but only the first one within the
//! cooldown window should reach a ranger's phone.
//!
//! # State Machine
//!
//! Per (entity, zone) key:
//!
//! ```text
//!              try_acquire            cooldown elapsed
//!    Never ─────────────────► Cooling ─────────────────► Ready
//!                               ▲  │                       │
//!                               │  │ try_acquire           │ try_acquire
//!                               │  ▼ (Suppressed)          │
//!                               └──────────────────────────┘
//! ```
//!
//! `force_send` always sends and restarts the cooldown.
//!
//! The throttle is keyed per pair, so an elephant leaving the camp does not
//! silence alerts for a different elephant, or for the same elephant leaving
//! a different zone.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::membership::{EntityId, TransitionKind};
use crate::zone::ZoneId;

/// Minimum time between two alerts for the same (entity, zone) pair.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);

/// Which transition kinds produce alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertTrigger {
    /// Alert when an animal leaves a zone.
    #[default]
    Exit,
    /// Alert when an animal enters a zone.
    Entry,
    /// Alert on both.
    Both,
}

impl AlertTrigger {
    /// Returns `true` if transitions of `kind` should be considered for an alert.
    pub fn triggers(&self, kind: TransitionKind) -> bool {
        matches!(
            (self, kind),
            (AlertTrigger::Both, _)
                | (AlertTrigger::Exit, TransitionKind::Exit)
                | (AlertTrigger::Entry, TransitionKind::Entry)
        )
    }
}

impl std::str::FromStr for AlertTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exit" => Ok(AlertTrigger::Exit),
            "entry" => Ok(AlertTrigger::Entry),
            "both" => Ok(AlertTrigger::Both),
            other => Err(format!("unknown alert trigger '{}'", other)),
        }
    }
}

impl std::fmt::Display for AlertTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertTrigger::Exit => f.write_str("exit"),
            AlertTrigger::Entry => f.write_str("entry"),
            AlertTrigger::Both => f.write_str("both"),
        }
    }
}

/// Outcome of a [`NotificationThrottle::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Send the alert; the send time has been recorded.
    Send,
    /// Within the cooldown window.
    Suppressed {
        /// When the last alert for this pair went out (epoch ms).
        last_sent_at: i64,
        /// Milliseconds until the pair may alert again.
        retry_after_ms: i64,
    },
}

impl ThrottleDecision {
    pub fn is_send(&self) -> bool {
        matches!(self, ThrottleDecision::Send)
    }
}

/// Per-(entity, zone) cooldown on outgoing alerts.
///
/// Safe to share between tasks. Check-and-record goes through a single
/// map entry, so two concurrent callers for the same key cannot both get
/// [`ThrottleDecision::Send`] inside one cooldown window.
#[derive(Debug)]
pub struct NotificationThrottle {
    cooldown_ms: i64,
    trigger: AlertTrigger,
    last_sent: DashMap<(EntityId, ZoneId), i64>,
}

impl NotificationThrottle {
    /// Creates a throttle with the given cooldown and trigger.
    pub fn new(cooldown: Duration, trigger: AlertTrigger) -> Self {
        Self {
            cooldown_ms: i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX),
            trigger,
            last_sent: DashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.max(0) as u64)
    }

    pub fn trigger(&self) -> AlertTrigger {
        self.trigger
    }

    /// Returns `true` if transitions of `kind` go through the throttle at all.
    pub fn triggers(&self, kind: TransitionKind) -> bool {
        self.trigger.triggers(kind)
    }

    /// Returns `true` if an alert for the pair at `now` would be sent.
    ///
    /// Does not record anything; pair with [`record_sent`](Self::record_sent)
    /// or use [`try_acquire`](Self::try_acquire).
    pub fn should_send(&self, entity: &EntityId, zone: &ZoneId, now: i64) -> bool {
        let key = (entity.clone(), zone.clone());
        self.last_sent
            .get(&key)
            .is_none_or(|last| now.saturating_sub(*last) >= self.cooldown_ms)
    }

    /// Records that an alert for the pair went out at `now`.
    pub fn record_sent(&self, entity: &EntityId, zone: &ZoneId, now: i64) {
        self.last_sent.insert((entity.clone(), zone.clone()), now);
    }

    /// Checks the cooldown and, if the alert may go out, records it.
    pub fn try_acquire(&self, entity: &EntityId, zone: &ZoneId, now: i64) -> ThrottleDecision {
        match self.last_sent.entry((entity.clone(), zone.clone())) {
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                ThrottleDecision::Send
            }
            Entry::Occupied(mut occupied) => {
                let last = *occupied.get();
                let elapsed = now.saturating_sub(last);
                if elapsed >= self.cooldown_ms {
                    occupied.insert(now);
                    ThrottleDecision::Send
                } else {
                    tracing::debug!(
                        entity = %entity,
                        zone = %zone,
                        elapsed_ms = elapsed,
                        "Alert suppressed by cooldown"
                    );
                    ThrottleDecision::Suppressed {
                        last_sent_at: last,
                        retry_after_ms: self.cooldown_ms.saturating_sub(elapsed),
                    }
                }
            }
        }
    }

    /// Records a send at `now` regardless of the cooldown.
    pub fn force_send(&self, entity: &EntityId, zone: &ZoneId, now: i64) {
        tracing::info!(entity = %entity, zone = %zone, "Forcing alert past cooldown");
        self.record_sent(entity, zone, now);
    }

    /// When the last alert for the pair went out, if ever.
    pub fn last_sent(&self, entity: &EntityId, zone: &ZoneId) -> Option<i64> {
        self.last_sent
            .get(&(entity.clone(), zone.clone()))
            .map(|last| *last)
    }

    /// Number of pairs with a recorded send.
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    pub fn clear(&self) {
        self.last_sent.clear();
    }
}

impl Default for NotificationThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, AlertTrigger::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> (EntityId, ZoneId) {
        (EntityId::from(1), ZoneId::from("camp"))
    }

    mod cooldown {
        use super::*;

        #[test]
        fn test_first_alert_is_sent() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();
            assert!(throttle.should_send(&entity, &zone, 0));
            assert_eq!(throttle.try_acquire(&entity, &zone, 0), ThrottleDecision::Send);
        }

        #[test]
        fn test_second_alert_within_cooldown_is_suppressed() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();

            assert!(throttle.try_acquire(&entity, &zone, 0).is_send());
            assert_eq!(
                throttle.try_acquire(&entity, &zone, 60_000),
                ThrottleDecision::Suppressed {
                    last_sent_at: 0,
                    retry_after_ms: 60_000
                }
            );
        }

        #[test]
        fn test_alert_after_cooldown_is_sent() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();

            assert!(throttle.try_acquire(&entity, &zone, 0).is_send());
            assert!(throttle.try_acquire(&entity, &zone, 130_000).is_send());
            assert_eq!(throttle.last_sent(&entity, &zone), Some(130_000));
        }

        #[test]
        fn test_cooldown_boundary_is_inclusive_of_send() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();

            throttle.record_sent(&entity, &zone, 0);
            assert!(!throttle.should_send(&entity, &zone, 119_999));
            assert!(throttle.should_send(&entity, &zone, 120_000));
        }

        #[test]
        fn test_suppressed_attempt_does_not_extend_window() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();

            throttle.try_acquire(&entity, &zone, 0);
            throttle.try_acquire(&entity, &zone, 100_000);
            assert!(throttle.try_acquire(&entity, &zone, 120_000).is_send());
        }

        #[test]
        fn test_pairs_are_independent() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();

            throttle.try_acquire(&entity, &zone, 0);
            assert!(throttle
                .try_acquire(&EntityId::from(2), &zone, 1)
                .is_send());
            assert!(throttle
                .try_acquire(&entity, &ZoneId::from("river"), 1)
                .is_send());
            assert_eq!(throttle.len(), 3);
        }

        #[test]
        fn test_force_send_restarts_cooldown() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();

            throttle.try_acquire(&entity, &zone, 0);
            throttle.force_send(&entity, &zone, 10_000);
            assert!(!throttle.should_send(&entity, &zone, 120_000));
            assert!(throttle.should_send(&entity, &zone, 130_000));
        }

        #[test]
        fn test_custom_cooldown() {
            let throttle = NotificationThrottle::new(Duration::from_secs(5), AlertTrigger::Both);
            let (entity, zone) = key();

            throttle.try_acquire(&entity, &zone, 0);
            assert!(throttle.try_acquire(&entity, &zone, 5_000).is_send());
            assert_eq!(throttle.cooldown(), Duration::from_secs(5));
        }

        #[test]
        fn test_extreme_timestamps_do_not_overflow() {
            let throttle = NotificationThrottle::default();
            let (entity, zone) = key();

            throttle.try_acquire(&entity, &zone, i64::MAX);
            assert!(!throttle.should_send(&entity, &zone, i64::MIN));
            assert!(!throttle.try_acquire(&entity, &zone, i64::MIN).is_send());
        }
    }

    mod concurrency {
        use super::*;
        use std::sync::Arc;

        #[test]
        fn test_concurrent_acquire_sends_once() {
            let throttle = Arc::new(NotificationThrottle::default());
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let throttle = Arc::clone(&throttle);
                    std::thread::spawn(move || {
                        let (entity, zone) = key();
                        throttle.try_acquire(&entity, &zone, 0).is_send()
                    })
                })
                .collect();

            let sent = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|sent| *sent)
                .count();
            assert_eq!(sent, 1);
        }
    }

    mod trigger {
        use super::*;

        #[test]
        fn test_default_is_exit_only() {
            let trigger = AlertTrigger::default();
            assert!(trigger.triggers(TransitionKind::Exit));
            assert!(!trigger.triggers(TransitionKind::Entry));
        }

        #[test]
        fn test_both() {
            assert!(AlertTrigger::Both.triggers(TransitionKind::Exit));
            assert!(AlertTrigger::Both.triggers(TransitionKind::Entry));
        }

        #[test]
        fn test_parse_and_display() {
            assert_eq!("Entry".parse(), Ok(AlertTrigger::Entry));
            assert_eq!(AlertTrigger::Both.to_string(), "both");
            assert!("sideways".parse::<AlertTrigger>().is_err());
        }
    }
}
