//! Tuskwatch - geofence alerts for wildlife tracking
//!
//! This library turns a stream of animal position samples into per-frame
//! position updates and zone-transition alerts. Positions arrive from a
//! recorded replay, a synthetic random walk, or an external detector; the
//! results are broadcast to browser clients over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! FrameSource ──► TrackingSession ──────────────► SessionEvent (broadcast)
//!                  │  geo        (local → lat/lng)        │
//!                  │  zone       (ZoneRegistry)            ▼
//!                  │  membership (ENTRY / EXIT)     server (WebSocket)
//!                  │  throttle   (cooldown)
//!                  └─ notify     (fire-and-forget alerts)
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod geo;
pub mod logging;
pub mod membership;
pub mod notify;
pub mod server;
pub mod session;
pub mod source;
pub mod throttle;
pub mod zone;

/// Crate version, as reported in status messages and the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Boxed future type for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Current wall-clock time as epoch milliseconds.
///
/// Sample timestamps and throttle bookkeeping all use this unit.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
