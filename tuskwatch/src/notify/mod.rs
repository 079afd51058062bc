//! Alert delivery.
//!
//! Alerts leave the tracking loop through a [`Notifier`]. Delivery is
//! fire-and-forget: [`NotificationDispatcher::dispatch`] spawns a task per
//! alert with a timeout and returns immediately, so a slow SMS gateway can
//! never stall frame processing. Failures are logged and counted, nothing
//! more.
//!
//! # Providers
//!
//! - [`LogNotifier`]: writes the alert to the log (default)
//! - [`WebhookNotifier`]: POSTs the alert as JSON to an HTTP endpoint, which
//!   can front any SMS or messaging gateway
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tuskwatch::notify::{LogNotifier, NotificationDispatcher};
//!
//! let dispatcher = NotificationDispatcher::new(Arc::new(LogNotifier), Duration::from_secs(10));
//! dispatcher.dispatch(alert);
//! ```

mod webhook;

pub use webhook::WebhookNotifier;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::membership::{EntityId, Transition, TransitionKind};
use crate::zone::{Zone, ZoneId};
use crate::BoxFuture;

/// Default upper bound on a single delivery attempt.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from delivering an alert.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be reached or the request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Delivery took longer than the dispatch timeout.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The alert could not be encoded.
    #[error("Failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An alert about to be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub entity_id: EntityId,
    pub zone_id: ZoneId,
    pub zone_label: String,
    pub kind: TransitionKind,
    /// Human-readable text, suitable for an SMS body.
    pub message: String,
    /// When the transition happened (epoch ms).
    pub at: i64,
}

impl Alert {
    /// Builds the alert for a transition in `zone`.
    pub fn for_transition(transition: &Transition, zone: &Zone) -> Self {
        let label = zone.display_name().to_string();
        let verb = match transition.kind {
            TransitionKind::Entry => "entered",
            TransitionKind::Exit => "left",
        };
        Self {
            entity_id: transition.entity_id.clone(),
            zone_id: transition.zone_id.clone(),
            message: format!(
                "ALERT: Elephant {} {} {}",
                transition.entity_id, verb, label
            ),
            zone_label: label,
            kind: transition.kind,
            at: transition.at,
        }
    }
}

/// Delivers alerts to the outside world.
///
/// Implementations must be `Send + Sync`; the dispatcher calls them from
/// spawned tasks.
pub trait Notifier: Send + Sync {
    /// Deliver one alert.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the alert could not be delivered. The
    /// caller logs the error; it never affects tracking.
    fn notify<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Writes alerts to the log at WARN level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            tracing::warn!(
                entity = %alert.entity_id,
                zone = %alert.zone_id,
                kind = %alert.kind,
                "{}",
                alert.message
            );
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Delivery counters shared between the dispatcher and its tasks.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Spawns one bounded delivery task per alert.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    stats: Arc<DispatchStats>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher.
    ///
    /// # Arguments
    ///
    /// * `notifier` - Where alerts are delivered
    /// * `timeout` - Upper bound on each delivery attempt
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            notifier,
            timeout,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Dispatcher that only logs.
    pub fn logging() -> Self {
        Self::new(Arc::new(LogNotifier), DEFAULT_DISPATCH_TIMEOUT)
    }

    /// Same notifier and timeout with zeroed counters.
    pub fn renewed(&self) -> Self {
        Self::new(Arc::clone(&self.notifier), self.timeout)
    }

    /// Delivers `alert` in the background.
    ///
    /// Must be called from within a Tokio runtime. The returned handle can be
    /// awaited in tests; production callers drop it.
    pub fn dispatch(&self, alert: Alert) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let stats = Arc::clone(&self.stats);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, notifier.notify(&alert)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            };
            match result {
                Ok(()) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        provider = notifier.name(),
                        entity = %alert.entity_id,
                        zone = %alert.zone_id,
                        "Alert delivered"
                    );
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        provider = notifier.name(),
                        entity = %alert.entity_id,
                        zone = %alert.zone_id,
                        error = %e,
                        "Alert delivery failed"
                    );
                }
            }
        })
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn provider(&self) -> &str {
        self.notifier.name()
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("provider", &self.notifier.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
