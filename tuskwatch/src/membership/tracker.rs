//! The membership state machine.
//!
//! # State Machine
//!
//! Every (entity, zone) pair is in one of two states. Pairs never observed
//! start `Outside`.
//!
//! ```text
//!            sample inside zone
//!   Outside ────────────────────► Inside     emits ENTRY
//!      ▲                             │
//!      │    sample outside zone      │
//!      └─────────────────────────────┘       emits EXIT
//! ```
//!
//! Samples that leave a pair in its current state emit nothing, so an animal
//! standing still inside a zone produces exactly one ENTRY no matter how many
//! frames arrive.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::sample::{EntityId, EntityPosition, SampleError, Transition, TransitionKind};
use crate::geo::ReferenceFrame;
use crate::zone::{ResolvedPosition, ZoneId, ZoneRegistry};

/// What happens to existing membership when the zone registry is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    /// Silently drop memberships of zones that no longer exist; keep the rest.
    #[default]
    PruneRemoved,
    /// Forget all memberships; every entity is re-evaluated from `Outside`,
    /// so the next sample re-emits ENTRY for zones it is inside.
    ResetAll,
}

impl std::str::FromStr for ReplacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prune" | "prune_removed" => Ok(ReplacePolicy::PruneRemoved),
            "reset" | "reset_all" => Ok(ReplacePolicy::ResetAll),
            other => Err(format!("unknown replace policy '{}'", other)),
        }
    }
}

/// Per-entity zone membership.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    memberships: HashMap<EntityId, BTreeSet<ZoneId>>,
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one sample against every zone and return the transitions it causes.
    ///
    /// Exits are returned before entries; each group is ordered by zone id.
    /// On error the entity's stored membership is left untouched.
    pub fn observe(
        &mut self,
        position: &EntityPosition,
        frame: &ReferenceFrame,
        registry: &ZoneRegistry,
    ) -> Result<Vec<Transition>, SampleError> {
        let local = position.local();
        if !local.is_finite() {
            return Err(SampleError::NonNumeric {
                entity: position.entity_id.clone(),
                field: if position.x.is_finite() { "y" } else { "x" },
            });
        }

        let geo = if registry.has_geographic_zones() {
            let geo = frame
                .to_geo(local)
                .map_err(|source| SampleError::Projection {
                    entity: position.entity_id.clone(),
                    source,
                })?;
            Some(geo)
        } else {
            None
        };
        let resolved = ResolvedPosition { local, geo };

        let current: BTreeSet<ZoneId> = registry
            .iter()
            .filter(|zone| zone.contains(&resolved))
            .map(|zone| zone.id.clone())
            .collect();

        let previous = self
            .memberships
            .entry(position.entity_id.clone())
            .or_default();

        let mut transitions = Vec::new();
        for zone_id in previous.difference(&current) {
            // A zone removed from the registry is not an exit.
            if registry.contains(zone_id) {
                transitions.push(Transition {
                    kind: TransitionKind::Exit,
                    entity_id: position.entity_id.clone(),
                    zone_id: zone_id.clone(),
                    at: position.timestamp,
                });
            }
        }
        for zone_id in current.difference(previous) {
            transitions.push(Transition {
                kind: TransitionKind::Entry,
                entity_id: position.entity_id.clone(),
                zone_id: zone_id.clone(),
                at: position.timestamp,
            });
        }

        trace!(
            entity = %position.entity_id,
            inside = current.len(),
            transitions = transitions.len(),
            "Sample evaluated"
        );
        *previous = current;

        Ok(transitions)
    }

    /// Bring membership in line with a replaced registry.
    ///
    /// Returns the number of (entity, zone) memberships that were dropped.
    /// No transitions are emitted.
    pub fn reconcile(&mut self, registry: &ZoneRegistry, policy: ReplacePolicy) -> usize {
        let mut dropped = 0;
        match policy {
            ReplacePolicy::PruneRemoved => {
                for zones in self.memberships.values_mut() {
                    let before = zones.len();
                    zones.retain(|id| registry.contains(id));
                    dropped += before - zones.len();
                }
            }
            ReplacePolicy::ResetAll => {
                dropped = self.memberships.values().map(BTreeSet::len).sum();
                self.memberships.clear();
            }
        }
        debug!(?policy, dropped, "Membership reconciled with zone registry");
        dropped
    }

    /// Zones the entity currently occupies, in id order.
    pub fn zones_for(&self, entity: &EntityId) -> Vec<&ZoneId> {
        self.memberships
            .get(entity)
            .map(|zones| zones.iter().collect())
            .unwrap_or_default()
    }

    /// Entities currently inside `zone`, in id order.
    pub fn entities_in(&self, zone: &ZoneId) -> Vec<&EntityId> {
        let mut entities: Vec<&EntityId> = self
            .memberships
            .iter()
            .filter(|(_, zones)| zones.contains(zone))
            .map(|(entity, _)| entity)
            .collect();
        entities.sort();
        entities
    }

    pub fn is_inside(&self, entity: &EntityId, zone: &ZoneId) -> bool {
        self.memberships
            .get(entity)
            .is_some_and(|zones| zones.contains(zone))
    }

    /// Number of entities seen this session.
    pub fn tracked_entities(&self) -> usize {
        self.memberships.len()
    }

    /// Entities inside at least one zone, in id order.
    pub fn occupied(&self) -> Vec<&EntityId> {
        let mut entities: Vec<&EntityId> = self
            .memberships
            .iter()
            .filter(|(_, zones)| !zones.is_empty())
            .map(|(entity, _)| entity)
            .collect();
        entities.sort();
        entities
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.memberships.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{LatLng, LocalPoint};
    use crate::zone::{Zone, ZoneDefinition};

    fn square_registry() -> ZoneRegistry {
        ZoneRegistry::with_zones(vec![Zone::square(
            "A",
            LocalPoint::new(200.0, 250.0),
            100.0,
        )])
    }

    fn sample(id: i64, x: f64, y: f64, t: i64) -> EntityPosition {
        EntityPosition::new(id, x, y, t)
    }

    fn kinds(transitions: &[Transition]) -> Vec<(TransitionKind, &str)> {
        transitions
            .iter()
            .map(|t| (t.kind, t.zone_id.as_str()))
            .collect()
    }

    #[test]
    fn test_entry_then_exit_once_each() {
        let registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        let outside = tracker
            .observe(&sample(1, 0.0, 0.0, 0), &frame, &registry)
            .unwrap();
        assert!(outside.is_empty());

        let entry = tracker
            .observe(&sample(1, 220.0, 260.0, 1), &frame, &registry)
            .unwrap();
        assert_eq!(kinds(&entry), vec![(TransitionKind::Entry, "A")]);
        assert_eq!(entry[0].at, 1);

        for t in 2..10 {
            let stay = tracker
                .observe(&sample(1, 210.0 + t as f64, 260.0, t), &frame, &registry)
                .unwrap();
            assert!(stay.is_empty(), "no events while stable");
        }

        let exit = tracker
            .observe(&sample(1, 400.0, 400.0, 10), &frame, &registry)
            .unwrap();
        assert_eq!(kinds(&exit), vec![(TransitionKind::Exit, "A")]);

        let still_out = tracker
            .observe(&sample(1, 401.0, 400.0, 11), &frame, &registry)
            .unwrap();
        assert!(still_out.is_empty());
    }

    #[test]
    fn test_replaying_identical_sample_is_idempotent() {
        let registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();
        let s = sample(1, 220.0, 260.0, 5);

        assert_eq!(tracker.observe(&s, &frame, &registry).unwrap().len(), 1);
        assert!(tracker.observe(&s, &frame, &registry).unwrap().is_empty());
        assert!(tracker.is_inside(&EntityId::from(1), &ZoneId::from("A")));
    }

    #[test]
    fn test_entities_are_independent() {
        let registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        tracker
            .observe(&sample(1, 220.0, 260.0, 0), &frame, &registry)
            .unwrap();
        let other = tracker
            .observe(&sample(2, 220.0, 260.0, 0), &frame, &registry)
            .unwrap();
        assert_eq!(other.len(), 1, "entity 2 gets its own entry");
        assert_eq!(
            tracker.entities_in(&ZoneId::from("A")),
            vec![&EntityId::from(1), &EntityId::from(2)]
        );
    }

    #[test]
    fn test_simultaneous_entry_into_two_zones() {
        let registry = ZoneRegistry::with_zones(vec![
            Zone::square("B", LocalPoint::new(0.0, 0.0), 10.0),
            Zone::square("A", LocalPoint::new(1.0, 1.0), 10.0),
        ]);
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        let transitions = tracker
            .observe(&sample(1, 0.5, 0.5, 0), &frame, &registry)
            .unwrap();
        assert_eq!(
            kinds(&transitions),
            vec![(TransitionKind::Entry, "A"), (TransitionKind::Entry, "B")]
        );
    }

    #[test]
    fn test_moving_between_zones_exits_before_entering() {
        let registry = ZoneRegistry::with_zones(vec![
            Zone::square("A", LocalPoint::new(0.0, 0.0), 10.0),
            Zone::square("B", LocalPoint::new(100.0, 0.0), 10.0),
        ]);
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        tracker
            .observe(&sample(1, 0.0, 0.0, 0), &frame, &registry)
            .unwrap();
        let transitions = tracker
            .observe(&sample(1, 100.0, 0.0, 1), &frame, &registry)
            .unwrap();
        assert_eq!(
            kinds(&transitions),
            vec![(TransitionKind::Exit, "A"), (TransitionKind::Entry, "B")]
        );
    }

    #[test]
    fn test_circle_zone_uses_geographic_projection() {
        let reference = LatLng::new(-1.2921, 34.7617);
        let frame = ReferenceFrame::new(reference, 1.0).unwrap();
        let mut registry = ZoneRegistry::new();
        registry.replace(vec![ZoneDefinition::circle(
            "waterhole",
            reference.lat,
            reference.lng,
            50.0,
        )]);
        let mut tracker = MembershipTracker::new();

        let entry = tracker
            .observe(&sample(1, 30.0, 30.0, 0), &frame, &registry)
            .unwrap();
        assert_eq!(kinds(&entry), vec![(TransitionKind::Entry, "waterhole")]);

        // ~56.6 m from the centre
        let exit = tracker
            .observe(&sample(1, 40.0, 40.0, 1), &frame, &registry)
            .unwrap();
        assert_eq!(kinds(&exit), vec![(TransitionKind::Exit, "waterhole")]);
    }

    #[test]
    fn test_malformed_sample_leaves_state_unchanged() {
        let registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        tracker
            .observe(&sample(1, 220.0, 260.0, 0), &frame, &registry)
            .unwrap();
        let err = tracker
            .observe(&sample(1, f64::NAN, 0.0, 1), &frame, &registry)
            .unwrap_err();
        assert!(matches!(err, SampleError::NonNumeric { field: "x", .. }));
        assert!(tracker.is_inside(&EntityId::from(1), &ZoneId::from("A")));

        // Still inside: no duplicate entry after the bad tick
        let transitions = tracker
            .observe(&sample(1, 221.0, 260.0, 2), &frame, &registry)
            .unwrap();
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_prune_on_replace_emits_no_phantom_exit() {
        let mut registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        tracker
            .observe(&sample(1, 220.0, 260.0, 0), &frame, &registry)
            .unwrap();

        registry.replace(vec![ZoneDefinition::square("B", 1000.0, 1000.0, 10.0)]);
        let dropped = tracker.reconcile(&registry, ReplacePolicy::PruneRemoved);
        assert_eq!(dropped, 1);
        assert!(tracker.zones_for(&EntityId::from(1)).is_empty());

        let transitions = tracker
            .observe(&sample(1, 220.0, 260.0, 1), &frame, &registry)
            .unwrap();
        assert!(transitions.is_empty(), "no EXIT for removed zone A");
    }

    #[test]
    fn test_prune_keeps_surviving_zones() {
        let mut registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        tracker
            .observe(&sample(1, 220.0, 260.0, 0), &frame, &registry)
            .unwrap();
        registry.replace(vec![
            ZoneDefinition::square("A", 200.0, 250.0, 100.0),
            ZoneDefinition::square("C", 900.0, 900.0, 10.0),
        ]);
        tracker.reconcile(&registry, ReplacePolicy::PruneRemoved);

        let transitions = tracker
            .observe(&sample(1, 220.0, 260.0, 1), &frame, &registry)
            .unwrap();
        assert!(transitions.is_empty(), "A survived the replace, still inside");
    }

    #[test]
    fn test_reset_all_retriggers_entry() {
        let mut registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        tracker
            .observe(&sample(1, 220.0, 260.0, 0), &frame, &registry)
            .unwrap();
        registry.replace(vec![ZoneDefinition::square("A", 200.0, 250.0, 100.0)]);
        tracker.reconcile(&registry, ReplacePolicy::ResetAll);

        let transitions = tracker
            .observe(&sample(1, 220.0, 260.0, 1), &frame, &registry)
            .unwrap();
        assert_eq!(kinds(&transitions), vec![(TransitionKind::Entry, "A")]);
    }

    #[test]
    fn test_stale_membership_without_reconcile_is_not_an_exit() {
        let mut registry = square_registry();
        let frame = ReferenceFrame::default();
        let mut tracker = MembershipTracker::new();

        tracker
            .observe(&sample(1, 220.0, 260.0, 0), &frame, &registry)
            .unwrap();
        registry.replace(Vec::new());

        let transitions = tracker
            .observe(&sample(1, 0.0, 0.0, 1), &frame, &registry)
            .unwrap();
        assert!(transitions.is_empty());
        assert!(tracker.zones_for(&EntityId::from(1)).is_empty());
    }

    #[test]
    fn test_replace_policy_from_str() {
        assert_eq!("prune".parse(), Ok(ReplacePolicy::PruneRemoved));
        assert_eq!("RESET_ALL".parse(), Ok(ReplacePolicy::ResetAll));
        assert!("sometimes".parse::<ReplacePolicy>().is_err());
    }
}
