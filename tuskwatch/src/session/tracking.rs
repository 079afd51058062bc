//! The tracking session: one sequential pipeline per stream.

use std::future::Future;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{ApplyReport, ConfigUpdate, SessionConfig};
use super::event::{CompletionReason, FrameUpdate, PositionUpdate, SessionEvent, SuppressReason};
use super::stats::SessionStats;
use super::{SessionCommand, SessionError, SessionHandle, SessionStatus, SessionSummary};
use crate::membership::{EntityId, MembershipTracker, Transition, TransitionKind};
use crate::notify::{Alert, NotificationDispatcher};
use crate::source::{Frame, FrameSource};
use crate::throttle::{NotificationThrottle, ThrottleDecision};
use crate::zone::{ZoneId, ZoneRegistry};

/// Capacity of the command channel created by [`TrackingSession::spawn`].
const COMMAND_CAPACITY: usize = 32;

/// Log progress every this many frames.
const PROGRESS_INTERVAL: u64 = 50;

/// Owns all state of one tracking run.
///
/// Frames are processed one at a time, in arrival order. Within a frame,
/// samples are evaluated in ascending entity id order. Commands (config
/// updates, forced alerts, status queries) are only handled between frames,
/// so every sample sees one consistent zone set and calibration.
///
/// Alert delivery is spawned onto the Tokio runtime, so
/// [`process_frame`](Self::process_frame) must be called from within one.
pub struct TrackingSession {
    config: SessionConfig,
    registry: ZoneRegistry,
    tracker: MembershipTracker,
    throttle: NotificationThrottle,
    dispatcher: NotificationDispatcher,
    events: broadcast::Sender<SessionEvent>,
    stats: SessionStats,
    source_name: String,
    total_frames: Option<u64>,
    /// Latest sample timestamp seen, in stream time.
    stream_clock: Option<i64>,
    running: bool,
}

impl TrackingSession {
    /// Creates a session with its own event channel.
    ///
    /// # Arguments
    ///
    /// * `config` - Calibration, pacing and alert policy
    /// * `registry` - Initial zones
    /// * `dispatcher` - Where alerts go
    pub fn new(
        config: SessionConfig,
        registry: ZoneRegistry,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self::with_events(config, registry, dispatcher, events)
    }

    /// Creates a session that publishes into an existing event channel.
    pub fn with_events(
        config: SessionConfig,
        registry: ZoneRegistry,
        dispatcher: NotificationDispatcher,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let throttle = NotificationThrottle::new(config.cooldown, config.trigger);
        Self {
            config,
            registry,
            tracker: MembershipTracker::new(),
            throttle,
            dispatcher,
            events,
            stats: SessionStats::default(),
            source_name: String::new(),
            total_frames: None,
            stream_clock: None,
            running: false,
        }
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &MembershipTracker {
        &self.tracker
    }

    /// Counters, including asynchronous delivery failures.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            alerts_failed: self.dispatcher.stats().failed(),
            ..self.stats
        }
    }

    /// Snapshot for status queries.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            running: self.running,
            source: self.source_name.clone(),
            total_frames: self.total_frames,
            frame_rate: self.config.frame_rate(),
            generation: self.registry.generation(),
            zones: self.registry.ids().cloned().collect(),
            tracked_entities: self.tracker.tracked_entities(),
            occupied: self.tracker.occupied().into_iter().cloned().collect(),
            frame: self.config.frame,
            stats: self.stats(),
        }
    }

    /// Evaluates one frame and publishes the resulting events.
    ///
    /// Malformed samples are reported and skipped; they never abort the
    /// frame. Returns the transitions, exits before entries per entity.
    pub fn process_frame(&mut self, frame: Frame) -> Vec<Transition> {
        let fallback_timestamp = frame.timestamp.unwrap_or_else(crate::now_millis);

        let mut accepted = Vec::with_capacity(frame.objects.len());
        for record in &frame.objects {
            match record.to_position(fallback_timestamp) {
                Ok(position) => accepted.push((position, record)),
                Err(e) => {
                    self.reject_sample(frame.frame_number, e.entity().cloned(), e.to_string())
                }
            }
        }
        accepted.sort_by(|a, b| a.0.entity_id.cmp(&b.0.entity_id));

        let mut transitions = Vec::new();
        let mut positions = Vec::with_capacity(accepted.len());
        for (position, record) in accepted {
            match self
                .tracker
                .observe(&position, &self.config.frame, &self.registry)
            {
                Ok(changes) => {
                    self.stats.samples_processed += 1;
                    positions.push(PositionUpdate {
                        geo: self.config.frame.to_geo(position.local()).ok(),
                        zones: self
                            .tracker
                            .zones_for(&position.entity_id)
                            .into_iter()
                            .cloned()
                            .collect(),
                        entity_id: position.entity_id,
                        x: position.x,
                        y: position.y,
                        timestamp: position.timestamp,
                        confidence: record.confidence,
                        object_type: record.object_type.clone(),
                    });
                    transitions.extend(changes);
                }
                Err(e) => self.reject_sample(
                    frame.frame_number,
                    Some(position.entity_id),
                    e.to_string(),
                ),
            }
        }

        if let Some(latest) = positions.iter().map(|p| p.timestamp).max().or(frame.timestamp) {
            self.stream_clock = Some(self.stream_clock.map_or(latest, |t| t.max(latest)));
        }

        self.stats.frames_processed += 1;
        self.publish(SessionEvent::FrameUpdate(FrameUpdate {
            frame_number: frame.frame_number,
            timestamp: fallback_timestamp,
            total_frames: self.total_frames,
            positions,
            occupied: self.tracker.occupied().into_iter().cloned().collect(),
        }));

        for transition in &transitions {
            self.handle_transition(transition);
        }

        transitions
    }

    fn reject_sample(&mut self, frame_number: u64, entity_id: Option<EntityId>, reason: String) {
        self.stats.samples_rejected += 1;
        warn!(frame = frame_number, reason = %reason, "Skipping malformed sample");
        self.publish(SessionEvent::SampleRejected {
            frame_number,
            entity_id,
            reason,
        });
    }

    fn handle_transition(&mut self, transition: &Transition) {
        match transition.kind {
            TransitionKind::Entry => self.stats.entries += 1,
            TransitionKind::Exit => self.stats.exits += 1,
        }
        info!(
            entity = %transition.entity_id,
            zone = %transition.zone_id,
            kind = %transition.kind,
            "Zone transition"
        );
        self.publish(SessionEvent::transition(transition.clone()));

        if !self.throttle.triggers(transition.kind) {
            return;
        }
        let Some(zone) = self.registry.get(&transition.zone_id) else {
            return;
        };

        match self
            .throttle
            .try_acquire(&transition.entity_id, &transition.zone_id, transition.at)
        {
            ThrottleDecision::Send => {
                let alert = Alert::for_transition(transition, zone);
                self.dispatcher.dispatch(alert.clone());
                self.stats.alerts_sent += 1;
                self.publish(SessionEvent::AlertSent(alert));
            }
            ThrottleDecision::Suppressed { retry_after_ms, .. } => {
                self.stats.alerts_suppressed += 1;
                self.publish(SessionEvent::AlertSuppressed {
                    entity_id: transition.entity_id.clone(),
                    zone_id: transition.zone_id.clone(),
                    reason: SuppressReason::Cooldown,
                    retry_after_ms,
                });
            }
        }
    }

    /// Applies a configuration update.
    ///
    /// Calibration and zones are applied independently: an invalid reference
    /// point does not stop a valid zone list from taking effect, and invalid
    /// zone entries are dropped one by one.
    pub fn apply_config(&mut self, update: ConfigUpdate) -> ApplyReport {
        let mut frame_error = None;
        if update.changes_frame() {
            match update.resolve_frame(&self.config.frame) {
                Ok(frame) => {
                    info!(
                        reference = %frame.reference,
                        meters_per_unit = frame.meters_per_unit,
                        "Camera calibration updated"
                    );
                    self.config.frame = frame;
                }
                Err(e) => {
                    warn!(error = %e, "Rejecting calibration update");
                    frame_error = Some(e.to_string());
                }
            }
        }

        let mut rejected = Vec::new();
        let mut dropped_memberships = 0;
        if let Some(zones) = update.zones {
            let report = self.registry.replace_values(zones);
            rejected = report.rejected.iter().map(ToString::to_string).collect();
            dropped_memberships = self
                .tracker
                .reconcile(&self.registry, self.config.replace_policy);
        }

        self.stats.config_updates += 1;
        let report = ApplyReport {
            generation: self.registry.generation(),
            zones: self.registry.ids().cloned().collect(),
            rejected,
            frame_error,
            dropped_memberships,
            frame: self.config.frame,
        };
        self.publish(SessionEvent::ConfigApplied(report.clone()));
        report
    }

    /// Sends an alert for the pair immediately, bypassing the cooldown.
    ///
    /// The alert describes an entry if the entity is currently inside the
    /// zone, an exit otherwise. The cooldown restarts from `now`.
    pub fn force_alert(
        &mut self,
        entity_id: EntityId,
        zone_id: ZoneId,
        now: i64,
    ) -> Result<Alert, SessionError> {
        let zone = self
            .registry
            .get(&zone_id)
            .ok_or_else(|| SessionError::UnknownZone(zone_id.clone()))?;

        let kind = if self.tracker.is_inside(&entity_id, &zone_id) {
            TransitionKind::Entry
        } else {
            TransitionKind::Exit
        };
        let transition = Transition {
            kind,
            entity_id,
            zone_id,
            at: now,
        };

        self.throttle
            .force_send(&transition.entity_id, &transition.zone_id, now);
        let alert = Alert::for_transition(&transition, zone);
        self.dispatcher.dispatch(alert.clone());
        self.stats.alerts_sent += 1;
        self.stats.alerts_forced += 1;
        self.publish(SessionEvent::AlertSent(alert.clone()));
        Ok(alert)
    }

    /// Current time on the stream's clock: the latest sample timestamp, or
    /// wall-clock time before the first frame.
    pub fn stream_time(&self) -> i64 {
        self.stream_clock.unwrap_or_else(crate::now_millis)
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::UpdateConfig { update, reply } => {
                let report = self.apply_config(update);
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            SessionCommand::ForceAlert {
                entity_id,
                zone_id,
                reply,
            } => {
                let now = self.stream_time();
                let result = self.force_alert(entity_id, zone_id, now);
                if let Err(e) = &result {
                    warn!(error = %e, "Forced alert refused");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Drives `future` to completion while serving commands.
    ///
    /// Returns `None` if the session was cancelled first.
    async fn until<F: Future>(
        &mut self,
        future: F,
        commands: &mut mpsc::Receiver<SessionCommand>,
        commands_open: &mut bool,
        cancel: &CancellationToken,
    ) -> Option<F::Output> {
        tokio::pin!(future);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                command = commands.recv(), if *commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => *commands_open = false,
                },
                output = &mut future => return Some(output),
            }
        }
    }

    /// Pulls frames from `source` at the configured rate until it is
    /// exhausted or `cancel` fires.
    ///
    /// Cancellation is only observed between frames; a frame that has been
    /// received is always fully processed.
    pub async fn run(
        mut self,
        mut source: Box<dyn FrameSource>,
        mut commands: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) -> SessionSummary {
        self.source_name = source.name().to_string();
        self.total_frames = source.total_frames();
        self.running = true;

        info!(
            source = %self.source_name,
            total_frames = ?self.total_frames,
            fps = self.config.frame_rate(),
            zones = self.registry.len(),
            "Tracking session started"
        );
        self.publish(SessionEvent::Started {
            source: self.source_name.clone(),
            total_frames: self.total_frames,
        });

        let mut ticker = tokio::time::interval(self.config.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        let reason = loop {
            if self
                .until(ticker.tick(), &mut commands, &mut commands_open, &cancel)
                .await
                .is_none()
            {
                break CompletionReason::Cancelled;
            }

            let next = match self
                .until(
                    source.next_frame(),
                    &mut commands,
                    &mut commands_open,
                    &cancel,
                )
                .await
            {
                Some(next) => next,
                None => break CompletionReason::Cancelled,
            };

            match next {
                Ok(Some(frame)) => {
                    let frame_number = frame.frame_number;
                    let objects = frame.objects.len();
                    self.process_frame(frame);
                    if self.stats.frames_processed % PROGRESS_INTERVAL == 0 {
                        info!(
                            frame = frame_number,
                            total = ?self.total_frames,
                            objects,
                            "Tracking progress"
                        );
                    } else {
                        debug!(frame = frame_number, objects, "Frame processed");
                    }
                }
                Ok(None) => break CompletionReason::Exhausted,
                Err(e) => {
                    error!(error = %e, "Frame source failed");
                    break CompletionReason::SourceFailed;
                }
            }
        };

        self.running = false;
        let stats = self.stats();
        info!(reason = ?reason, %stats, "Tracking session finished");
        self.publish(SessionEvent::Completed {
            reason,
            frames_processed: stats.frames_processed,
            stats,
        });

        SessionSummary { reason, stats }
    }

    /// Runs the session on its own task.
    pub fn spawn(self, source: Box<dyn FrameSource>, cancel: CancellationToken) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(self.run(source, commands_rx, cancel.clone()));
        SessionHandle::new(commands_tx, cancel, task)
    }
}

impl std::fmt::Debug for TrackingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSession")
            .field("source", &self.source_name)
            .field("zones", &self.registry.len())
            .field("running", &self.running)
            .field("stats", &self.stats)
            .finish()
    }
}
