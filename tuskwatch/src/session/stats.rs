//! Session counters.

use serde::{Deserialize, Serialize};

/// Running totals for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub frames_processed: u64,
    pub samples_processed: u64,
    pub samples_rejected: u64,
    pub entries: u64,
    pub exits: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub alerts_forced: u64,
    /// Deliveries that failed or timed out. Updated asynchronously.
    pub alerts_failed: u64,
    pub config_updates: u64,
}

impl SessionStats {
    /// Total transitions observed.
    pub fn transitions(&self) -> u64 {
        self.entries + self.exits
    }

    /// Fraction of samples rejected as malformed.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.samples_processed + self.samples_rejected;
        if total == 0 {
            0.0
        } else {
            self.samples_rejected as f64 / total as f64
        }
    }
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} samples ({} rejected), {} entries, {} exits, {} alerts sent, {} suppressed",
            self.frames_processed,
            self.samples_processed,
            self.samples_rejected,
            self.entries,
            self.exits,
            self.alerts_sent,
            self.alerts_suppressed
        )
    }
}
