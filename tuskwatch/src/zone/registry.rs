//! The active set of zones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::definition::{ConfigError, ZoneDefinition};
use super::model::{Zone, ZoneId, ZoneShape};
use crate::geo::LocalPoint;

/// Zone id used for the legacy single-boundary mode.
pub const BOUNDARY_ZONE_ID: &str = "boundary";

/// Outcome of a [`ZoneRegistry::replace`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceReport {
    /// Generation of the registry after the replace.
    pub generation: u64,
    /// Zones now active, in id order.
    pub accepted: Vec<ZoneId>,
    /// Entries that were dropped.
    pub rejected: Vec<ConfigError>,
}

impl ReplaceReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Legacy single square boundary on the local plane.
///
/// Older deployments configure one static "restricted area" that is switched
/// on or off as a whole. It is modelled as a one-zone registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub enabled: bool,
    pub center: LocalPoint,
    pub size: f64,
    pub name: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            center: LocalPoint::new(200.0, 250.0),
            size: 100.0,
            name: "Restricted Area".to_string(),
        }
    }
}

/// Holds the current set of zones.
///
/// The set is only ever replaced wholesale. Zones are kept ordered by id so
/// that evaluation, and therefore event order, is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: BTreeMap<ZoneId, Zone>,
    generation: u64,
}

impl ZoneRegistry {
    /// Create an empty registry (generation 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from already-built zones.
    ///
    /// Duplicate ids keep the first occurrence, as with [`replace`](Self::replace).
    pub fn with_zones(zones: impl IntoIterator<Item = Zone>) -> Self {
        let mut registry = Self::new();
        registry.replace_zones(zones);
        registry
    }

    /// Create a registry holding the legacy boundary, or nothing when disabled.
    pub fn from_boundary(boundary: &BoundaryConfig) -> Self {
        let zones = boundary
            .enabled
            .then(|| {
                Zone::square(BOUNDARY_ZONE_ID, boundary.center, boundary.size)
                    .with_label(boundary.name.clone())
            })
            .into_iter();
        Self::with_zones(zones)
    }

    /// Replace every zone with the valid subset of `definitions`.
    ///
    /// Malformed entries are logged and reported in the returned
    /// [`ReplaceReport`]; they never abort the update.
    pub fn replace(&mut self, definitions: Vec<ZoneDefinition>) -> ReplaceReport {
        let results = definitions
            .iter()
            .enumerate()
            .map(|(index, def)| def.validate(index))
            .collect();
        self.install(results)
    }

    /// Replace from raw JSON entries, parsing each independently.
    pub fn replace_values(&mut self, values: Vec<serde_json::Value>) -> ReplaceReport {
        let results = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| ZoneDefinition::from_value(index, value)?.validate(index))
            .collect();
        self.install(results)
    }

    /// Replace with already-built zones, still enforcing positive extents.
    pub fn replace_zones(&mut self, zones: impl IntoIterator<Item = Zone>) -> ReplaceReport {
        let results = zones.into_iter().map(check_extent).collect();
        self.install(results)
    }

    fn install(&mut self, results: Vec<Result<Zone, ConfigError>>) -> ReplaceReport {
        let mut zones = BTreeMap::new();
        let mut rejected = Vec::new();

        for result in results {
            match result {
                Ok(zone) if zones.contains_key(&zone.id) => {
                    rejected.push(ConfigError::DuplicateId { id: zone.id });
                }
                Ok(zone) => {
                    zones.insert(zone.id.clone(), zone);
                }
                Err(e) => rejected.push(e),
            }
        }

        for error in &rejected {
            warn!(error = %error, "Dropping invalid zone definition");
        }

        self.zones = zones;
        self.generation += 1;

        info!(
            generation = self.generation,
            zones = self.zones.len(),
            rejected = rejected.len(),
            "Zone registry replaced"
        );

        ReplaceReport {
            generation: self.generation,
            accepted: self.zones.keys().cloned().collect(),
            rejected,
        }
    }

    /// Look up a zone.
    pub fn get(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    pub fn contains(&self, id: &ZoneId) -> bool {
        self.zones.contains_key(id)
    }

    /// Zones in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Zone ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &ZoneId> {
        self.zones.keys()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Increments on every replace; 0 for a fresh registry.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether any zone needs geographic coordinates.
    pub fn has_geographic_zones(&self) -> bool {
        self.zones.values().any(Zone::is_geographic)
    }
}

fn check_extent(zone: Zone) -> Result<Zone, ConfigError> {
    match zone.shape {
        ZoneShape::Circle { radius_meters, .. }
            if !(radius_meters.is_finite() && radius_meters > 0.0) =>
        {
            Err(ConfigError::InvalidRadius {
                id: zone.id,
                value: radius_meters.to_string(),
            })
        }
        ZoneShape::Square { size, .. } if !(size.is_finite() && size > 0.0) => {
            Err(ConfigError::InvalidSize {
                id: zone.id,
                value: size.to_string(),
            })
        }
        _ => Ok(zone),
    }
}
