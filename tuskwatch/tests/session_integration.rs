//! Integration tests for the tracking session.
//!
//! These tests drive complete sessions through their public API:
//! - Channel and replay sources → transitions → alerts
//! - Cooldown suppression with sample timestamps
//! - Zone replacement while a session is running
//! - Cooldown after forced alerts and zone restores
//! - One event per boundary crossing (property test)
//!
//! Run with: `cargo test --test session_integration`

use std::io::Write;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use tuskwatch::geo::{square_contains, LocalPoint};
use tuskwatch::membership::{EntityId, SampleRecord, TransitionKind};
use tuskwatch::notify::NotificationDispatcher;
use tuskwatch::session::{
    CompletionReason, ConfigUpdate, SessionConfig, SessionError, SessionEvent, TrackingSession,
};
use tuskwatch::source::{ChannelSource, Frame, SourceConfig};
use tuskwatch::throttle::AlertTrigger;
use tuskwatch::zone::{Zone, ZoneId, ZoneRegistry};

// ============================================================================
// Helper Functions
// ============================================================================

const INSIDE: (f64, f64) = (200.0, 250.0);
const OUTSIDE: (f64, f64) = (100.0, 100.0);

/// The classic single restricted area.
fn boundary_registry() -> ZoneRegistry {
    ZoneRegistry::with_zones(vec![Zone::square(
        "boundary",
        LocalPoint::new(200.0, 250.0),
        100.0,
    )
    .with_label("Restricted Area")])
}

fn fast_config() -> SessionConfig {
    SessionConfig::default().with_frame_interval(Duration::from_millis(10))
}

fn frame(number: u64, timestamp: i64, positions: &[(i64, (f64, f64))]) -> Frame {
    Frame::new(
        number,
        timestamp,
        positions
            .iter()
            .map(|(id, (x, y))| SampleRecord::new(*id, *x, *y))
            .collect(),
    )
}

/// Collects events up to and including `Completed`.
async fn collect_events(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let collect = async {
        let mut collected = Vec::new();
        while let Ok(event) = events.recv().await {
            let done = matches!(event, SessionEvent::Completed { .. });
            collected.push(event);
            if done {
                break;
            }
        }
        collected
    };
    tokio::time::timeout(Duration::from_secs(600), collect)
        .await
        .expect("session did not complete")
}

/// Waits for the frame update of `frame_number`.
async fn wait_for_frame(events: &mut broadcast::Receiver<SessionEvent>, frame_number: u64) {
    loop {
        if let Ok(SessionEvent::FrameUpdate(update)) = events.recv().await {
            if update.frame_number == frame_number {
                return;
            }
        }
    }
}

/// "sent" / "suppressed" for each alert decision, in order.
fn alert_outcomes(events: &[SessionEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::AlertSent(_) => Some("sent"),
            SessionEvent::AlertSuppressed { .. } => Some("suppressed"),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Crossings produce transitions, and exit alerts respect the cooldown.
#[tokio::test(start_paused = true)]
async fn test_channel_pipeline_with_cooldown() {
    let session = TrackingSession::new(
        fast_config().with_trigger(AlertTrigger::Exit),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let mut events = session.subscribe();
    let (sender, source) = ChannelSource::new(16);
    let handle = session.spawn(Box::new(source), CancellationToken::new());

    let path = [
        (0, OUTSIDE),
        (1_000, INSIDE),
        (2_000, OUTSIDE),
        (3_000, INSIDE),
        (4_000, OUTSIDE),
        (130_000, INSIDE),
        (200_000, OUTSIDE),
    ];
    for (i, (timestamp, position)) in path.iter().enumerate() {
        sender
            .send(frame(i as u64 + 1, *timestamp, &[(1, *position)]))
            .await
            .unwrap();
    }
    drop(sender);

    let collected = collect_events(&mut events).await;
    let summary: Vec<&str> = collected
        .iter()
        .map(SessionEvent::name)
        .filter(|name| *name != "frame_update")
        .collect();
    assert_eq!(
        summary,
        vec![
            "started",
            "entry",
            "exit",
            "alert_sent",
            "entry",
            "exit",
            "alert_suppressed",
            "entry",
            "exit",
            "alert_sent",
            "completed",
        ]
    );

    let summary = handle.join().await.unwrap();
    assert_eq!(summary.reason, CompletionReason::Exhausted);
    assert_eq!(summary.stats.frames_processed, 7);
    assert_eq!(summary.stats.entries, 3);
    assert_eq!(summary.stats.exits, 3);
    assert_eq!(summary.stats.alerts_sent, 2);
    assert_eq!(summary.stats.alerts_suppressed, 1);
}

/// Alerts name the animal and the zone label.
#[tokio::test(start_paused = true)]
async fn test_alert_message_names_zone() {
    let session = TrackingSession::new(
        fast_config().with_trigger(AlertTrigger::Both),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let mut events = session.subscribe();
    let (sender, source) = ChannelSource::new(4);
    let handle = session.spawn(Box::new(source), CancellationToken::new());

    sender.send(frame(1, 10, &[(7, INSIDE)])).await.unwrap();
    drop(sender);

    let alerts: Vec<_> = collect_events(&mut events)
        .await
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::AlertSent(alert) => Some(alert),
            _ => None,
        })
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, TransitionKind::Entry);
    assert_eq!(alerts[0].message, "ALERT: Elephant 7 entered Restricted Area");
    handle.join().await.unwrap();
}

/// A recorded file replays every frame and reports its length.
#[tokio::test(start_paused = true)]
async fn test_replay_file_session() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let recording = json!({
        "metadata": {"total_frames": 3, "fps": 30.0, "video_duration": 0.1},
        "frames": [
            {"frame_number": 1, "timestamp": 1000, "objects": [
                {"id": 1, "x": 100, "y": 100},
                {"id": 2, "x": 210, "y": 240}
            ]},
            {"frame_number": 2, "timestamp": 2000, "objects": [
                {"id": 1, "x": 205, "y": 255},
                {"id": 2, "x": "bad", "y": 240}
            ]},
            {"frame_number": 3, "timestamp": 3000, "objects": [
                {"id": 1, "x": 100, "y": 100}
            ]}
        ]
    });
    file.write_all(recording.to_string().as_bytes()).unwrap();

    let mut config = SourceConfig::replay(file.path());
    config.restamp = false;
    let source = config.open().unwrap();

    let session = TrackingSession::new(
        fast_config(),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let mut events = session.subscribe();
    let handle = session.spawn(source, CancellationToken::new());
    let collected = collect_events(&mut events).await;

    assert!(matches!(
        collected.first(),
        Some(SessionEvent::Started {
            total_frames: Some(3),
            ..
        })
    ));
    let frames = collected
        .iter()
        .filter(|event| matches!(event, SessionEvent::FrameUpdate(_)))
        .count();
    assert_eq!(frames, 3);

    let transitions: Vec<(EntityId, TransitionKind, i64)> = collected
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Entry(t) | SessionEvent::Exit(t) => {
                Some((t.entity_id.clone(), t.kind, t.at))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (EntityId::from(2), TransitionKind::Entry, 1000),
            (EntityId::from(1), TransitionKind::Entry, 2000),
            (EntityId::from(1), TransitionKind::Exit, 3000),
        ]
    );

    let summary = handle.join().await.unwrap();
    assert_eq!(summary.stats.samples_rejected, 1);
}

/// Replacing the zones mid-run never produces exits for removed zones.
#[tokio::test(start_paused = true)]
async fn test_zone_replace_while_running() {
    let session = TrackingSession::new(
        fast_config(),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let mut events = session.subscribe();
    let (sender, source) = ChannelSource::new(4);
    let handle = session.spawn(Box::new(source), CancellationToken::new());

    sender.send(frame(1, 1_000, &[(1, INSIDE)])).await.unwrap();
    wait_for_frame(&mut events, 1).await;

    let report = handle
        .update_config(ConfigUpdate::zones(vec![json!({
            "id": "waterhole",
            "center": {"x": 50, "y": 50},
            "size": 40
        })]))
        .await
        .unwrap();
    assert_eq!(report.zones, vec![ZoneId::from("waterhole")]);
    assert_eq!(report.dropped_memberships, 1);

    sender.send(frame(2, 2_000, &[(1, INSIDE)])).await.unwrap();
    sender.send(frame(3, 3_000, &[(1, (50.0, 50.0))])).await.unwrap();
    drop(sender);

    let collected = collect_events(&mut events).await;
    assert!(!collected
        .iter()
        .any(|event| matches!(event, SessionEvent::Exit(_))));
    let entries: Vec<ZoneId> = collected
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Entry(t) => Some(t.zone_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(entries, vec![ZoneId::from("waterhole")]);
    handle.join().await.unwrap();
}

/// Forced alerts go out regardless of the cooldown but need a real zone.
#[tokio::test(start_paused = true)]
async fn test_force_alert_through_handle() {
    let session = TrackingSession::new(
        fast_config(),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let (sender, source) = ChannelSource::new(4);
    let handle = session.spawn(Box::new(source), CancellationToken::new());

    let alert = handle
        .force_alert(EntityId::from(4), ZoneId::from("boundary"))
        .await
        .unwrap();
    assert_eq!(alert.kind, TransitionKind::Exit);
    let again = handle
        .force_alert(EntityId::from(4), ZoneId::from("boundary"))
        .await;
    assert!(again.is_ok());

    let missing = handle
        .force_alert(EntityId::from(4), ZoneId::from("nowhere"))
        .await;
    assert_eq!(
        missing,
        Err(SessionError::UnknownZone(ZoneId::from("nowhere")))
    );

    let status = handle.status().await.unwrap();
    assert_eq!(status.stats.alerts_forced, 2);
    assert!(status.running);

    drop(sender);
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.reason, CompletionReason::Exhausted);
}

/// A forced alert restarts the cooldown on the stream's clock, not the wall
/// clock, so detector timestamps far from "now" still alert normally.
#[tokio::test(start_paused = true)]
async fn test_cooldown_after_forced_alert_uses_stream_time() {
    let session = TrackingSession::new(
        fast_config(),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let mut events = session.subscribe();
    let (sender, source) = ChannelSource::new(4);
    let handle = session.spawn(Box::new(source), CancellationToken::new());

    sender.send(frame(1, 0, &[(1, INSIDE)])).await.unwrap();
    wait_for_frame(&mut events, 1).await;

    let forced = handle
        .force_alert(EntityId::from(1), ZoneId::from("boundary"))
        .await
        .unwrap();
    assert_eq!(forced.at, 0);

    sender.send(frame(2, 200_000, &[(1, OUTSIDE)])).await.unwrap();
    drop(sender);

    let collected = collect_events(&mut events).await;
    assert_eq!(alert_outcomes(&collected), vec!["sent", "sent"]);
    handle.join().await.unwrap();
}

/// Removing a zone and restoring it does not reset its cooldown.
#[tokio::test(start_paused = true)]
async fn test_cooldown_survives_zone_removal_and_restore() {
    let session = TrackingSession::new(
        fast_config(),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let mut events = session.subscribe();
    let (sender, source) = ChannelSource::new(4);
    let handle = session.spawn(Box::new(source), CancellationToken::new());

    sender.send(frame(1, 0, &[(1, INSIDE)])).await.unwrap();
    sender.send(frame(2, 1_000, &[(1, OUTSIDE)])).await.unwrap();
    wait_for_frame(&mut events, 2).await;

    let waterhole = json!({"id": "waterhole", "center": {"x": 50, "y": 50}, "size": 40});
    let boundary = json!({
        "id": "boundary",
        "label": "Restricted Area",
        "center": {"x": 200, "y": 250},
        "size": 100
    });
    handle
        .update_config(ConfigUpdate::zones(vec![waterhole.clone()]))
        .await
        .unwrap();
    let report = handle
        .update_config(ConfigUpdate::zones(vec![boundary, waterhole]))
        .await
        .unwrap();
    assert_eq!(report.zones.len(), 2);

    sender.send(frame(3, 10_000, &[(1, INSIDE)])).await.unwrap();
    sender.send(frame(4, 20_000, &[(1, OUTSIDE)])).await.unwrap();
    drop(sender);

    let collected = collect_events(&mut events).await;
    assert_eq!(alert_outcomes(&collected), vec!["sent", "suppressed"]);
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.stats.alerts_sent, 1);
    assert_eq!(summary.stats.alerts_suppressed, 1);
}

/// Stopping a session that waits for frames ends it promptly.
#[tokio::test(start_paused = true)]
async fn test_stop_idle_session() {
    let session = TrackingSession::new(
        fast_config(),
        boundary_registry(),
        NotificationDispatcher::logging(),
    );
    let (_sender, source) = ChannelSource::new(4);
    let handle = session.spawn(Box::new(source), CancellationToken::new());

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop();
    let summary = handle.join().await.unwrap();
    assert_eq!(summary.reason, CompletionReason::Cancelled);
    assert_eq!(summary.stats.frames_processed, 0);
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Every change of inside/outside state yields exactly one transition.
    #[test]
    fn prop_one_transition_per_crossing(
        path in prop::collection::vec((0.0f64..400.0, 0.0f64..400.0), 1..60)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let mut session = TrackingSession::new(
            SessionConfig::default(),
            boundary_registry(),
            NotificationDispatcher::logging(),
        );

        let center = LocalPoint::new(200.0, 250.0);
        let mut inside = false;
        let mut expected = 0;
        let mut observed = 0;
        for (i, (x, y)) in path.iter().enumerate() {
            let now_inside = square_contains(center, 100.0, LocalPoint::new(*x, *y));
            if now_inside != inside {
                expected += 1;
            }
            inside = now_inside;

            let transitions = session.process_frame(frame(i as u64 + 1, i as i64 * 1000, &[(1, (*x, *y))]));
            prop_assert!(transitions.len() <= 1);
            if let Some(t) = transitions.first() {
                let kind = if now_inside { TransitionKind::Entry } else { TransitionKind::Exit };
                prop_assert_eq!(t.kind, kind);
            }
            observed += transitions.len();
        }
        prop_assert_eq!(observed, expected);
        prop_assert_eq!(session.stats().transitions(), expected as u64);
    }
}
