//! JSON messages exchanged with map clients.
//!
//! Clients send commands tagged by `command`:
//!
//! ```text
//! {"command": "start_tracking"}
//! {"command": "update_config", "config": {"zones": [...]}}
//! {"command": "force_alert", "entityId": 3, "zoneId": "camp"}
//! ```
//!
//! The server answers and pushes updates as `{"type": ..., "data": ...}`.

use serde::{Deserialize, Serialize};

use crate::geo::{GeoError, LatLng, ReferenceFrame};
use crate::membership::{EntityId, Transition};
use crate::notify::Alert;
use crate::session::{
    ApplyReport, CompletionReason, ConfigUpdate, FrameUpdate, SessionEvent, SessionStats,
    SessionStatus,
};
use crate::zone::{Zone, ZoneId, ZoneRegistry, ZoneShape};

/// A command from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    StartTracking,
    StopTracking,
    GetStatus,
    UpdateConfig {
        #[serde(default)]
        config: ConfigUpdate,
    },
    ForceAlert {
        #[serde(rename = "entityId", alias = "entity_id")]
        entity_id: EntityId,
        #[serde(rename = "zoneId", alias = "zone_id")]
        zone_id: ZoneId,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::StartTracking => "start_tracking",
            ClientCommand::StopTracking => "stop_tracking",
            ClientCommand::GetStatus => "get_status",
            ClientCommand::UpdateConfig { .. } => "update_config",
            ClientCommand::ForceAlert { .. } => "force_alert",
        }
    }
}

/// Outcome carried by a `command_response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    TrackingStarted,
    AlreadyRunning,
    TrackingStopped,
    ConfigUpdated,
    AlertForced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ApplyReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,
}

impl CommandResponse {
    pub fn status(status: ResponseStatus) -> Self {
        Self {
            status,
            report: None,
            alert: None,
        }
    }
}

/// A zone as drawn on the map.
///
/// Squares are converted to their four geographic corners; a square whose
/// corners cannot be converted is sent without them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOverlay {
    pub id: ZoneId,
    pub label: String,
    #[serde(flatten)]
    pub shape: ZoneShape,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corners: Vec<LatLng>,
}

impl ZoneOverlay {
    pub fn new(zone: &Zone, frame: &ReferenceFrame) -> Self {
        let corners = match &zone.shape {
            ZoneShape::Square { center, size } => frame
                .square_outline(*center, *size)
                .unwrap_or_else(|e: GeoError| {
                    tracing::debug!(zone = %zone.id, error = %e, "No outline for zone");
                    Vec::new()
                }),
            ZoneShape::Circle { .. } => Vec::new(),
        };
        Self {
            id: zone.id.clone(),
            label: zone.display_name().to_string(),
            shape: zone.shape.clone(),
            corners,
        }
    }
}

/// Calibration and zones, sent on connect and after every config change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPayload {
    pub camera_config: ReferenceFrame,
    pub zones: Vec<ZoneOverlay>,
    pub generation: u64,
    pub status: String,
}

impl ConfigPayload {
    pub fn new(frame: &ReferenceFrame, registry: &ZoneRegistry) -> Self {
        Self {
            camera_config: *frame,
            zones: registry
                .iter()
                .map(|zone| ZoneOverlay::new(zone, frame))
                .collect(),
            generation: registry.generation(),
            status: "connected".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub is_running: bool,
    pub connected_clients: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatus>,
}

/// A message to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Config(ConfigPayload),
    CommandResponse(CommandResponse),
    Status(StatusPayload),
    #[serde(rename_all = "camelCase")]
    TrackingStarted {
        source: String,
        total_frames: Option<u64>,
    },
    LiveTrackingUpdate(FrameUpdate),
    ZoneTransition(Transition),
    AlertSent(Alert),
    #[serde(rename_all = "camelCase")]
    AlertSuppressed {
        entity_id: EntityId,
        zone_id: ZoneId,
        retry_after_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    TrackingComplete {
        reason: CompletionReason,
        total_frames: u64,
        stats: SessionStats,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// The client-facing form of a session event.
    ///
    /// Returns `None` for events clients do not see. Config changes are
    /// announced separately with a full [`ConfigPayload`].
    pub fn from_event(event: SessionEvent) -> Option<Self> {
        match event {
            SessionEvent::Started {
                source,
                total_frames,
            } => Some(ServerMessage::TrackingStarted {
                source,
                total_frames,
            }),
            SessionEvent::FrameUpdate(update) => Some(ServerMessage::LiveTrackingUpdate(update)),
            SessionEvent::Entry(transition) | SessionEvent::Exit(transition) => {
                Some(ServerMessage::ZoneTransition(transition))
            }
            SessionEvent::AlertSent(alert) => Some(ServerMessage::AlertSent(alert)),
            SessionEvent::AlertSuppressed {
                entity_id,
                zone_id,
                retry_after_ms,
                ..
            } => Some(ServerMessage::AlertSuppressed {
                entity_id,
                zone_id,
                retry_after_ms,
            }),
            SessionEvent::Completed {
                reason,
                frames_processed,
                stats,
            } => Some(ServerMessage::TrackingComplete {
                reason,
                total_frames: frames_processed,
                stats,
            }),
            SessionEvent::SampleRejected { .. } | SessionEvent::ConfigApplied(_) => None,
        }
    }

    /// Serializes for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
