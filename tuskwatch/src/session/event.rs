//! Events published by a tracking session.

use serde::{Deserialize, Serialize};

use super::config::ApplyReport;
use super::stats::SessionStats;
use crate::geo::LatLng;
use crate::membership::{EntityId, Transition};
use crate::notify::Alert;
use crate::zone::ZoneId;

/// Why an alert was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    Cooldown,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The source ran out of frames.
    Exhausted,
    /// The session was stopped.
    Cancelled,
    /// The source failed.
    SourceFailed,
}

/// Position of one entity in a frame update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    #[serde(rename = "id")]
    pub entity_id: EntityId,
    pub x: f64,
    pub y: f64,
    pub timestamp: i64,
    /// Geographic position, when the calibration allows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<LatLng>,
    /// Zones the entity is inside after this frame.
    pub zones: Vec<ZoneId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

/// Everything that happened in one frame, for map display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameUpdate {
    pub frame_number: u64,
    pub timestamp: i64,
    pub total_frames: Option<u64>,
    pub positions: Vec<PositionUpdate>,
    /// Entities inside at least one zone.
    pub occupied: Vec<EntityId>,
}

/// An event published by a [`TrackingSession`](super::TrackingSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session began pulling frames.
    Started {
        source: String,
        total_frames: Option<u64>,
    },
    /// Positions after a frame was processed.
    FrameUpdate(FrameUpdate),
    /// An entity entered a zone.
    Entry(Transition),
    /// An entity left a zone.
    Exit(Transition),
    /// An alert was handed to the notifier.
    AlertSent(Alert),
    /// An alert was withheld.
    AlertSuppressed {
        entity_id: EntityId,
        zone_id: ZoneId,
        reason: SuppressReason,
        retry_after_ms: i64,
    },
    /// A sample was malformed and skipped.
    SampleRejected {
        frame_number: u64,
        entity_id: Option<EntityId>,
        reason: String,
    },
    /// A configuration update took effect.
    ConfigApplied(ApplyReport),
    /// The session ended.
    Completed {
        reason: CompletionReason,
        frames_processed: u64,
        stats: SessionStats,
    },
}

impl SessionEvent {
    pub(crate) fn transition(transition: Transition) -> Self {
        match transition.kind {
            crate::membership::TransitionKind::Entry => SessionEvent::Entry(transition),
            crate::membership::TransitionKind::Exit => SessionEvent::Exit(transition),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Started { .. } => "started",
            SessionEvent::FrameUpdate(_) => "frame_update",
            SessionEvent::Entry(_) => "entry",
            SessionEvent::Exit(_) => "exit",
            SessionEvent::AlertSent(_) => "alert_sent",
            SessionEvent::AlertSuppressed { .. } => "alert_suppressed",
            SessionEvent::SampleRejected { .. } => "sample_rejected",
            SessionEvent::ConfigApplied(_) => "config_applied",
            SessionEvent::Completed { .. } => "completed",
        }
    }
}
