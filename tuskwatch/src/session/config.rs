//! Session configuration and runtime updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geo::{GeoError, LatLng, LocalPoint, ReferenceFrame};
use crate::membership::ReplacePolicy;
use crate::notify::DEFAULT_DISPATCH_TIMEOUT;
use crate::throttle::{AlertTrigger, DEFAULT_COOLDOWN};
use crate::zone::{Numeric, ZoneId};

/// Default streaming rate in frames per second.
pub const DEFAULT_FRAME_RATE: f64 = 5.0;

/// Default capacity of the session event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for one tracking session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time between frames.
    pub frame_interval: Duration,
    /// Camera calibration.
    pub frame: ReferenceFrame,
    /// Minimum time between alerts for one (entity, zone) pair.
    pub cooldown: Duration,
    /// Which transitions raise alerts.
    pub trigger: AlertTrigger,
    /// What a zone replace does to existing membership.
    pub replace_policy: ReplacePolicy,
    /// Upper bound on one alert delivery.
    pub dispatch_timeout: Duration,
    /// Events buffered per subscriber before slow subscribers lag.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_secs_f64(1.0 / DEFAULT_FRAME_RATE),
            frame: ReferenceFrame::default(),
            cooldown: DEFAULT_COOLDOWN,
            trigger: AlertTrigger::default(),
            replace_policy: ReplacePolicy::default(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Sets the streaming rate. Non-positive or non-finite rates are ignored.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        if fps.is_finite() && fps > 0.0 {
            self.frame_interval = Duration::from_secs_f64(1.0 / fps);
        }
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_reference_frame(mut self, frame: ReferenceFrame) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_trigger(mut self, trigger: AlertTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_replace_policy(mut self, policy: ReplacePolicy) -> Self {
        self.replace_policy = policy;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Frames per second implied by the frame interval.
    pub fn frame_rate(&self) -> f64 {
        let secs = self.frame_interval.as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            f64::INFINITY
        }
    }
}

/// Geographic point as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointUpdate {
    pub lat: Numeric,
    #[serde(alias = "lon")]
    pub lng: Numeric,
}

/// Planar point as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginUpdate {
    pub x: Numeric,
    pub y: Numeric,
}

/// Scale block of a configuration update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleUpdate {
    pub meters_per_unit: Numeric,
}

/// A runtime configuration update.
///
/// Every field is optional; absent fields keep their current value. Zones,
/// when present, replace the whole registry.
///
/// ```text
/// {"referencePoint": {"lat": -1.29, "lng": 34.76},
///  "scale": {"metersPerUnit": 0.5},
///  "origin": {"x": 320, "y": 240},
///  "zones": [{"id": "camp", "center": {"lat": -1.29, "lng": 34.76}, "radius": 150}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_point: Option<PointUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OriginUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<serde_json::Value>>,
}

impl ConfigUpdate {
    /// Update that only replaces the zones.
    pub fn zones(zones: Vec<serde_json::Value>) -> Self {
        Self {
            zones: Some(zones),
            ..Default::default()
        }
    }

    /// Whether the update touches camera calibration.
    pub fn changes_frame(&self) -> bool {
        self.reference_point.is_some() || self.scale.is_some() || self.origin.is_some()
    }

    /// Applies the calibration part of the update on top of `current`.
    ///
    /// The result is validated as a whole; on error `current` stays in force.
    pub fn resolve_frame(&self, current: &ReferenceFrame) -> Result<ReferenceFrame, GeoError> {
        let reference = match &self.reference_point {
            Some(point) => LatLng::new(
                point.lat.parse().ok_or(GeoError::NonFinite("referencePoint.lat"))?,
                point.lng.parse().ok_or(GeoError::NonFinite("referencePoint.lng"))?,
            ),
            None => current.reference,
        };
        let meters_per_unit = match &self.scale {
            Some(scale) => scale
                .meters_per_unit
                .parse()
                .ok_or(GeoError::NonFinite("scale.metersPerUnit"))?,
            None => current.meters_per_unit,
        };
        let origin = match &self.origin {
            Some(origin) => LocalPoint::new(
                origin.x.parse().ok_or(GeoError::NonFinite("origin.x"))?,
                origin.y.parse().ok_or(GeoError::NonFinite("origin.y"))?,
            ),
            None => current.origin,
        };
        ReferenceFrame::with_origin(reference, meters_per_unit, origin)
    }
}

/// What an applied [`ConfigUpdate`] changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    /// Registry generation after the update.
    pub generation: u64,
    /// Active zones, in id order.
    pub zones: Vec<ZoneId>,
    /// One message per zone definition that was dropped.
    pub rejected: Vec<String>,
    /// Why the calibration change was refused, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_error: Option<String>,
    /// Memberships forgotten because of the zone replace.
    pub dropped_memberships: usize,
    /// Calibration now in force.
    pub frame: ReferenceFrame,
}
