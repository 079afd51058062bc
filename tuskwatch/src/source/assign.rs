//! Identity assignment for anonymous detections.

use std::collections::{BTreeMap, BTreeSet};

use crate::geo::LocalPoint;
use crate::membership::{EntityId, SampleRecord};
use crate::zone::Numeric;

/// Maximum distance (local units) at which a detection is matched to a
/// previously seen track.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 100.0;

/// Gives ids to detections that arrive without one.
///
/// Each anonymous detection takes the id of the closest track seen in an
/// earlier frame, provided it lies strictly within the threshold and no other
/// detection of the same frame has claimed it. Otherwise a new id is minted.
/// Objects that already carry an id are left alone, but their numeric ids are
/// never reused for new tracks.
#[derive(Debug, Clone)]
pub struct NearestNeighborAssigner {
    threshold: f64,
    last_seen: BTreeMap<i64, LocalPoint>,
    next_id: i64,
}

impl NearestNeighborAssigner {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_seen: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Fill in missing ids for one frame, in place.
    ///
    /// Detections without usable coordinates are skipped; the session
    /// rejects them later.
    pub fn assign(&mut self, objects: &mut [SampleRecord]) {
        for object in objects.iter() {
            if let Some(EntityId::Number(id)) = object.id {
                self.next_id = self.next_id.max(id.saturating_add(1));
            }
        }

        let mut claimed = BTreeSet::new();
        let mut updates = Vec::new();

        for object in objects.iter_mut().filter(|o| o.id.is_none()) {
            let Some(point) = position(object) else {
                continue;
            };

            let nearest = self
                .last_seen
                .iter()
                .filter(|(id, _)| !claimed.contains(*id))
                .map(|(id, seen)| (*id, seen.distance_to(&point)))
                .filter(|(_, distance)| *distance < self.threshold)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            let id = match nearest {
                Some((id, _)) => id,
                None => {
                    let id = self.next_id;
                    self.next_id = self.next_id.saturating_add(1);
                    tracing::debug!(id, x = point.x, y = point.y, "New track");
                    id
                }
            };

            claimed.insert(id);
            updates.push((id, point));
            object.id = Some(EntityId::Number(id));
        }

        self.last_seen.extend(updates);
    }

    /// Number of tracks remembered.
    pub fn tracks(&self) -> usize {
        self.last_seen.len()
    }
}

impl Default for NearestNeighborAssigner {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

fn position(object: &SampleRecord) -> Option<LocalPoint> {
    let x = object.x.as_ref().and_then(Numeric::parse)?;
    let y = object.y.as_ref().and_then(Numeric::parse)?;
    Some(LocalPoint::new(x, y))
}
