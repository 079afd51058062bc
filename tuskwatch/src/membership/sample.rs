//! Position samples and the transitions they produce.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{GeoError, LocalPoint};
use crate::zone::{Numeric, ZoneId};

/// Identity of a tracked animal.
///
/// Detectors hand out integer track ids; recorded data often uses strings
/// such as `"elephant_3"`. Integers order before strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Name(String),
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Number(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Name(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Name(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{}", n),
            EntityId::Name(s) => f.write_str(s),
        }
    }
}

/// A validated position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPosition {
    #[serde(rename = "id")]
    pub entity_id: EntityId,
    pub x: f64,
    pub y: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl EntityPosition {
    pub fn new(entity_id: impl Into<EntityId>, x: f64, y: f64, timestamp: i64) -> Self {
        Self {
            entity_id: entity_id.into(),
            x,
            y,
            timestamp,
        }
    }

    pub fn local(&self) -> LocalPoint {
        LocalPoint::new(self.x, self.y)
    }
}

/// A malformed sample. It is skipped for this tick; tracker state is untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// The object carries no entity id.
    #[error("Sample has no entity id")]
    MissingEntity,

    /// A coordinate is absent or not a number.
    #[error("Entity {entity}: non-numeric {field}")]
    NonNumeric {
        entity: EntityId,
        field: &'static str,
    },

    /// The position could not be projected onto the globe.
    #[error("Entity {entity}: {source}")]
    Projection {
        entity: EntityId,
        #[source]
        source: GeoError,
    },
}

impl SampleError {
    /// The entity this error concerns, when known.
    pub fn entity(&self) -> Option<&EntityId> {
        match self {
            SampleError::MissingEntity => None,
            SampleError::NonNumeric { entity, .. } | SampleError::Projection { entity, .. } => {
                Some(entity)
            }
        }
    }
}

/// One object of a frame, as produced by a source.
///
/// Fields are loose so that a single bad object can be rejected without
/// rejecting the whole frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub x: Option<Numeric>,
    #[serde(default)]
    pub y: Option<Numeric>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

impl SampleRecord {
    /// Record for a well-formed sample.
    pub fn new(id: impl Into<EntityId>, x: f64, y: f64) -> Self {
        Self {
            id: Some(id.into()),
            x: Some(x.into()),
            y: Some(y.into()),
            ..Default::default()
        }
    }

    /// Validate into an [`EntityPosition`], stamping `fallback_timestamp`
    /// when the record carries none.
    pub fn to_position(&self, fallback_timestamp: i64) -> Result<EntityPosition, SampleError> {
        let entity = self.id.clone().ok_or(SampleError::MissingEntity)?;
        let x = self.x.as_ref().and_then(Numeric::parse);
        let y = self.y.as_ref().and_then(Numeric::parse);
        match (x, y) {
            (Some(x), Some(y)) => Ok(EntityPosition {
                entity_id: entity,
                x,
                y,
                timestamp: self.timestamp.unwrap_or(fallback_timestamp),
            }),
            (None, _) => Err(SampleError::NonNumeric { entity, field: "x" }),
            (_, None) => Err(SampleError::NonNumeric { entity, field: "y" }),
        }
    }
}

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Entry,
    Exit,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Entry => f.write_str("ENTRY"),
            TransitionKind::Exit => f.write_str("EXIT"),
        }
    }
}

/// A one-shot membership change for one (entity, zone) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub kind: TransitionKind,
    pub entity_id: EntityId,
    pub zone_id: ZoneId,
    /// Timestamp of the sample that caused the change (epoch ms).
    pub at: i64,
}
