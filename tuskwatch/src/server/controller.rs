//! Owns the single tracking session shared by all connections.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::ConfigPayload;
use super::ServerError;
use crate::membership::EntityId;
use crate::notify::{Alert, NotificationDispatcher};
use crate::session::{
    ApplyReport, ConfigUpdate, SessionConfig, SessionError, SessionEvent, SessionHandle,
    SessionStatus, TrackingSession,
};
use crate::source::SourceConfig;
use crate::zone::{ZoneId, ZoneRegistry};

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Settings and zones the next session starts from.
#[derive(Debug)]
struct ControllerState {
    config: SessionConfig,
    registry: ZoneRegistry,
    active: Option<Arc<SessionHandle>>,
    sessions_started: u64,
}

impl ControllerState {
    fn running(&self) -> Option<Arc<SessionHandle>> {
        self.active
            .as_ref()
            .filter(|handle| !handle.is_finished())
            .cloned()
    }

    /// Applies `update` to the baseline. Membership lives in sessions, so
    /// nothing is dropped here.
    fn apply(&mut self, update: ConfigUpdate) -> ApplyReport {
        let mut frame_error = None;
        if update.changes_frame() {
            match update.resolve_frame(&self.config.frame) {
                Ok(frame) => self.config.frame = frame,
                Err(e) => frame_error = Some(e.to_string()),
            }
        }
        let rejected = match update.zones {
            Some(zones) => self
                .registry
                .replace_values(zones)
                .rejected
                .iter()
                .map(ToString::to_string)
                .collect(),
            None => Vec::new(),
        };
        ApplyReport {
            generation: self.registry.generation(),
            zones: self.registry.ids().cloned().collect(),
            rejected,
            frame_error,
            dropped_memberships: 0,
            frame: self.config.frame,
        }
    }
}

/// Starts, stops and reconfigures tracking on behalf of clients.
///
/// At most one session runs at a time. Every session publishes into the
/// same event channel, so subscribers survive restarts. Configuration
/// updates are kept as the baseline for later sessions as well as being
/// forwarded to the running one.
pub struct TrackingController {
    source: SourceConfig,
    dispatcher: NotificationDispatcher,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    state: Mutex<ControllerState>,
}

impl TrackingController {
    pub fn new(
        config: SessionConfig,
        registry: ZoneRegistry,
        source: SourceConfig,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            source,
            dispatcher,
            events,
            shutdown: CancellationToken::new(),
            state: Mutex::new(ControllerState {
                config,
                registry,
                active: None,
                sessions_started: 0,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running().is_some()
    }

    pub fn sessions_started(&self) -> u64 {
        self.state.lock().sessions_started
    }

    /// Current calibration and zone overlays.
    pub fn config_payload(&self) -> ConfigPayload {
        let state = self.state.lock();
        ConfigPayload::new(&state.config.frame, &state.registry)
    }

    /// Starts a session on a freshly opened source.
    ///
    /// The source is opened on the blocking pool without holding the state
    /// lock; if another start won the race meanwhile, the opened source is
    /// dropped and `AlreadyRunning` is returned.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be opened, e.g. a missing replay file.
    pub async fn start(&self) -> Result<StartOutcome, ServerError> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let config = self.source.clone();
        let source = tokio::task::spawn_blocking(move || config.open())
            .await
            .map_err(std::io::Error::other)??;

        let mut state = self.state.lock();
        if state.running().is_some() {
            debug!("Discarding source opened by a concurrent start");
            return Ok(StartOutcome::AlreadyRunning);
        }
        let session = TrackingSession::with_events(
            state.config.clone(),
            state.registry.clone(),
            self.dispatcher.renewed(),
            self.events.clone(),
        );
        let handle = session.spawn(source, self.shutdown.child_token());
        state.active = Some(Arc::new(handle));
        state.sessions_started += 1;
        info!(
            session = state.sessions_started,
            source = ?self.source.kind,
            "Tracking started"
        );
        Ok(StartOutcome::Started)
    }

    /// Stops the running session. Returns whether one was running.
    pub fn stop(&self) -> bool {
        match self.state.lock().running() {
            Some(handle) => {
                handle.stop();
                info!("Tracking stop requested");
                true
            }
            None => false,
        }
    }

    /// Status of the running session, if any.
    pub async fn status(&self) -> Option<SessionStatus> {
        let handle = self.state.lock().running()?;
        handle.status().await.ok()
    }

    /// Applies `update` to the baseline and the running session.
    ///
    /// The report comes from the running session when there is one.
    pub async fn update_config(&self, update: ConfigUpdate) -> ApplyReport {
        let (baseline, handle) = {
            let mut state = self.state.lock();
            let baseline = state.apply(update.clone());
            (baseline, state.running())
        };

        if let Some(handle) = handle {
            match handle.update_config(update).await {
                Ok(report) => return report,
                Err(e) => warn!(error = %e, "Session ended before config update"),
            }
        }

        // Sessions announce their own updates; idle updates are announced here.
        let _ = self
            .events
            .send(SessionEvent::ConfigApplied(baseline.clone()));
        baseline
    }

    /// Forces an alert through the running session.
    pub async fn force_alert(
        &self,
        entity_id: EntityId,
        zone_id: ZoneId,
    ) -> Result<Alert, SessionError> {
        let handle = self
            .state
            .lock()
            .running()
            .ok_or(SessionError::NotRunning)?;
        handle.force_alert(entity_id, zone_id).await
    }

    /// Cancels the running session. Sessions started afterwards complete
    /// immediately.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for TrackingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingController")
            .field("source", &self.source.kind)
            .field("dispatcher", &self.dispatcher)
            .field("running", &self.is_running())
            .finish()
    }
}
