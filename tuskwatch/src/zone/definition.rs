//! Zone definitions as they arrive from configuration updates.
//!
//! Definitions are deliberately loose: browser clients send numbers as JSON
//! numbers or as strings, and may omit fields. [`ZoneDefinition::validate`]
//! turns one definition into a [`Zone`] or a [`ConfigError`] describing why
//! that single entry was dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Zone, ZoneId, ZoneShape};
use crate::geo::{LatLng, LocalPoint};

/// A malformed zone definition. The offending zone is skipped; the rest of
/// the update still applies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The entry could not be parsed as a zone definition at all.
    #[error("Zone #{index}: malformed definition: {reason}")]
    Malformed { index: usize, reason: String },

    /// The entry has no usable id.
    #[error("Zone #{index}: missing id")]
    MissingId { index: usize },

    /// Another zone in the same update already uses this id.
    #[error("Zone '{id}': duplicate id")]
    DuplicateId { id: ZoneId },

    /// No centre given.
    #[error("Zone '{id}': missing center")]
    MissingCenter { id: ZoneId },

    /// Centre coordinates did not parse or are out of range.
    #[error("Zone '{id}': invalid center: {reason}")]
    InvalidCenter { id: ZoneId, reason: String },

    /// Circle radius is not a positive finite number.
    #[error("Zone '{id}': invalid radius '{value}'")]
    InvalidRadius { id: ZoneId, value: String },

    /// Square size is not a positive finite number.
    #[error("Zone '{id}': invalid size '{value}'")]
    InvalidSize { id: ZoneId, value: String },

    /// Neither a radius (circle) nor a size (square) was given.
    #[error("Zone '{id}': missing radius or size")]
    MissingExtent { id: ZoneId },
}

/// A number that may arrive as a JSON number or a numeric string.
///
/// Anything else is kept as `Other` so that one bad field fails validation
/// of its own entry instead of failing deserialization of the whole message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Numeric {
    /// Parse to a finite `f64`.
    pub fn parse(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s.trim().parse().ok()?,
            Numeric::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Numeric::Number(value)
    }
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Numeric::Number(n) => write!(f, "{}", n),
            Numeric::Text(s) => f.write_str(s),
            Numeric::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Zone centre: geographic for circles, local for squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CenterDefinition {
    Geo {
        lat: Numeric,
        #[serde(alias = "lon")]
        lng: Numeric,
    },
    Local {
        x: Numeric,
        y: Numeric,
    },
}

/// One zone entry of a configuration update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneDefinition {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub center: Option<CenterDefinition>,
    #[serde(default, alias = "radiusMeters")]
    pub radius: Option<Numeric>,
    #[serde(default)]
    pub size: Option<Numeric>,
    #[serde(default, alias = "half_size")]
    pub half_size: Option<Numeric>,
}

impl ZoneDefinition {
    /// Definition of a geographic circle.
    pub fn circle(id: &str, lat: f64, lng: f64, radius: f64) -> Self {
        Self {
            id: Some(serde_json::Value::String(id.to_string())),
            center: Some(CenterDefinition::Geo {
                lat: lat.into(),
                lng: lng.into(),
            }),
            radius: Some(radius.into()),
            ..Default::default()
        }
    }

    /// Definition of a local-plane square.
    pub fn square(id: &str, x: f64, y: f64, size: f64) -> Self {
        Self {
            id: Some(serde_json::Value::String(id.to_string())),
            center: Some(CenterDefinition::Local {
                x: x.into(),
                y: y.into(),
            }),
            size: Some(size.into()),
            ..Default::default()
        }
    }

    /// Attach a label.
    pub fn labelled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Parse one raw JSON entry. `index` is its position in the update.
    pub fn from_value(index: usize, value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Malformed {
            index,
            reason: e.to_string(),
        })
    }

    /// Resolve the id, accepting strings and integers.
    fn zone_id(&self, index: usize) -> Result<ZoneId, ConfigError> {
        let id = match &self.id {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(ConfigError::MissingId { index }),
        };
        Ok(ZoneId::from(id))
    }

    /// Validate into a [`Zone`].
    pub fn validate(&self, index: usize) -> Result<Zone, ConfigError> {
        let id = self.zone_id(index)?;
        let center = self
            .center
            .as_ref()
            .ok_or_else(|| ConfigError::MissingCenter { id: id.clone() })?;

        let shape = match center {
            CenterDefinition::Geo { lat, lng } => {
                let (lat, lng) = match (lat.parse(), lng.parse()) {
                    (Some(lat), Some(lng)) => (lat, lng),
                    _ => {
                        return Err(ConfigError::InvalidCenter {
                            id,
                            reason: format!("non-numeric lat/lng ({}, {})", lat, lng),
                        })
                    }
                };
                let center = LatLng::checked(lat, lng).map_err(|e| ConfigError::InvalidCenter {
                    id: id.clone(),
                    reason: e.to_string(),
                })?;
                let radius = self
                    .radius
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingExtent { id: id.clone() })?;
                let radius_meters = positive(radius).ok_or_else(|| ConfigError::InvalidRadius {
                    id: id.clone(),
                    value: radius.to_string(),
                })?;
                ZoneShape::Circle {
                    center,
                    radius_meters,
                }
            }
            CenterDefinition::Local { x, y } => {
                let center = match (x.parse(), y.parse()) {
                    (Some(x), Some(y)) => LocalPoint::new(x, y),
                    _ => {
                        return Err(ConfigError::InvalidCenter {
                            id,
                            reason: format!("non-numeric x/y ({}, {})", x, y),
                        })
                    }
                };
                let size = match (&self.size, &self.half_size) {
                    (Some(size), _) => positive(size).ok_or_else(|| ConfigError::InvalidSize {
                        id: id.clone(),
                        value: size.to_string(),
                    })?,
                    (None, Some(half)) => {
                        positive(half).map(|h| h * 2.0).ok_or_else(|| {
                            ConfigError::InvalidSize {
                                id: id.clone(),
                                value: half.to_string(),
                            }
                        })?
                    }
                    (None, None) => return Err(ConfigError::MissingExtent { id }),
                };
                ZoneShape::Square { center, size }
            }
        };

        Ok(Zone {
            id,
            label: self.label.clone().filter(|l| !l.trim().is_empty()),
            shape,
        })
    }
}

fn positive(value: &Numeric) -> Option<f64> {
    value.parse().filter(|v| *v > 0.0)
}
