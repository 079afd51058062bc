//! Tracking Session
//!
//! Wires a frame source through membership tracking, the notification
//! throttle and alert dispatch, publishing everything that happens as
//! [`SessionEvent`]s.
//!
//! # Architecture
//!
//! ```text
//!                      SessionCommand (mpsc)
//!                              │
//!                              ▼
//! FrameSource ──tick──► TrackingSession ──► broadcast::Sender<SessionEvent>
//!                        │ ZoneRegistry
//!                        │ MembershipTracker
//!                        │ NotificationThrottle
//!                        └─► NotificationDispatcher ──spawn──► Notifier
//! ```
//!
//! A session is a single task. Frames are paced by a Tokio interval and
//! processed sequentially; commands and cancellation are only observed
//! between frames.
//!
//! # Example
//!
//! ```ignore
//! let session = TrackingSession::new(SessionConfig::default(), registry, dispatcher);
//! let mut events = session.subscribe();
//! let handle = session.spawn(source, CancellationToken::new());
//!
//! handle.update_config(ConfigUpdate::zones(zones)).await?;
//! while let Ok(event) = events.recv().await { /* ... */ }
//! ```

mod config;
mod event;
mod stats;
mod tracking;

pub use config::{
    ApplyReport, ConfigUpdate, OriginUpdate, PointUpdate, ScaleUpdate, SessionConfig,
    DEFAULT_EVENT_CAPACITY, DEFAULT_FRAME_RATE,
};
pub use event::{CompletionReason, FrameUpdate, PositionUpdate, SessionEvent, SuppressReason};
pub use stats::SessionStats;
pub use tracking::TrackingSession;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::geo::ReferenceFrame;
use crate::membership::EntityId;
use crate::notify::Alert;
use crate::zone::ZoneId;

/// Errors from session commands.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// A forced alert named a zone that is not configured.
    #[error("Unknown zone '{0}'")]
    UnknownZone(ZoneId),

    /// The session has ended.
    #[error("Session is not running")]
    NotRunning,

    /// The session task panicked.
    #[error("Session task failed: {0}")]
    TaskFailed(String),
}

/// Requests served by a running session between frames.
#[derive(Debug)]
pub enum SessionCommand {
    /// Apply a configuration update.
    UpdateConfig {
        update: ConfigUpdate,
        reply: Option<oneshot::Sender<ApplyReport>>,
    },
    /// Send an alert now, bypassing the cooldown.
    ForceAlert {
        entity_id: EntityId,
        zone_id: ZoneId,
        reply: Option<oneshot::Sender<Result<Alert, SessionError>>>,
    },
    /// Report current state.
    Status { reply: oneshot::Sender<SessionStatus> },
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub running: bool,
    pub source: String,
    pub total_frames: Option<u64>,
    pub frame_rate: f64,
    pub generation: u64,
    pub zones: Vec<ZoneId>,
    pub tracked_entities: usize,
    /// Entities inside at least one zone.
    pub occupied: Vec<EntityId>,
    pub frame: ReferenceFrame,
    pub stats: SessionStats,
}

/// Result of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: CompletionReason,
    pub stats: SessionStats,
}

/// Control handle for a session running on its own task.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SessionCommand>,
        cancel: CancellationToken,
        task: JoinHandle<SessionSummary>,
    ) -> Self {
        Self {
            commands,
            cancel,
            task,
        }
    }

    /// Applies `update` before the next frame and waits for the result.
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<ApplyReport, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::UpdateConfig {
            update,
            reply: Some(reply),
        })
        .await?;
        response.await.map_err(|_| SessionError::NotRunning)
    }

    /// Forces an alert for the pair.
    pub async fn force_alert(
        &self,
        entity_id: EntityId,
        zone_id: ZoneId,
    ) -> Result<Alert, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::ForceAlert {
            entity_id,
            zone_id,
            reply: Some(reply),
        })
        .await?;
        response.await.map_err(|_| SessionError::NotRunning)?
    }

    /// Current state of the session.
    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Status { reply }).await?;
        response.await.map_err(|_| SessionError::NotRunning)
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::NotRunning)
    }

    /// Asks the session to stop after the current frame.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the session to end.
    pub async fn join(self) -> Result<SessionSummary, SessionError> {
        self.task
            .await
            .map_err(|e| SessionError::TaskFailed(e.to_string()))
    }
}
