//! Core zone types.

use serde::{Deserialize, Serialize};

use crate::geo::{flat_distance_meters, square_contains, LatLng, LocalPoint};

/// Unique zone identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ZoneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Geometry of a zone.
///
/// Circles live on the globe; squares live on the camera's local plane and
/// are tested without any geographic conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ZoneShape {
    /// Geographic circle.
    Circle {
        center: LatLng,
        #[serde(rename = "radiusMeters")]
        radius_meters: f64,
    },
    /// Axis-aligned square on the local plane.
    Square { center: LocalPoint, size: f64 },
}

/// A position resolved into every coordinate space a zone may need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPosition {
    pub local: LocalPoint,
    /// Present whenever the registry holds at least one circle zone.
    pub geo: Option<LatLng>,
}

/// A named geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub shape: ZoneShape,
}

impl Zone {
    /// Create a geographic circle zone.
    pub fn circle(id: impl Into<ZoneId>, center: LatLng, radius_meters: f64) -> Self {
        Self {
            id: id.into(),
            label: None,
            shape: ZoneShape::Circle {
                center,
                radius_meters,
            },
        }
    }

    /// Create a local-plane square zone.
    pub fn square(id: impl Into<ZoneId>, center: LocalPoint, size: f64) -> Self {
        Self {
            id: id.into(),
            label: None,
            shape: ZoneShape::Square { center, size },
        }
    }

    /// Attach a human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label if set, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(self.id.as_str())
    }

    /// Whether this zone needs geographic coordinates to evaluate.
    pub fn is_geographic(&self) -> bool {
        matches!(self.shape, ZoneShape::Circle { .. })
    }

    /// Containment test.
    ///
    /// A circle with no geographic position available is never occupied.
    pub fn contains(&self, position: &ResolvedPosition) -> bool {
        match &self.shape {
            ZoneShape::Circle {
                center,
                radius_meters,
            } => position
                .geo
                .map(|geo| flat_distance_meters(geo, *center) <= *radius_meters)
                .unwrap_or(false),
            ZoneShape::Square { center, size } => square_contains(*center, *size, position.local),
        }
    }
}
