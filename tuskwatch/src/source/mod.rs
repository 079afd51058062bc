//! Frame sources.
//!
//! A [`FrameSource`] yields frames of object samples in order. The session
//! pulls one frame per tick and ends when the source is exhausted.
//!
//! # Providers
//!
//! | Source            | Frames come from                       | Ends        |
//! |-------------------|----------------------------------------|-------------|
//! | [`ReplaySource`]  | recorded tracking JSON file            | end of file |
//! | [`MockSource`]    | seeded random walk                     | frame limit |
//! | [`ChannelSource`] | an external detector over a channel    | sender drop |
//!
//! Detections without an id are given one by the
//! [`NearestNeighborAssigner`], which replay sources run before handing the
//! frame to the session.

mod assign;
mod channel;
mod mock;
mod replay;

pub use assign::{NearestNeighborAssigner, DEFAULT_MATCH_THRESHOLD};
pub use channel::ChannelSource;
pub use mock::{MockConfig, MockSource, DEFAULT_MOCK_FRAME_LIMIT};
pub use replay::{ReplayMetadata, ReplaySource, TrackingDataFile};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::membership::SampleRecord;
use crate::BoxFuture;

/// Errors from opening or reading a frame source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The replay file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The replay file is not valid tracking JSON.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A replay source was requested without a file.
    #[error("No replay file configured")]
    MissingFile,
}

/// One frame of detections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// 1-based position in the stream. Zero means "not set"; sources fill it in.
    #[serde(default, alias = "frame_number")]
    pub frame_number: u64,
    /// Capture time (epoch ms). Objects without their own timestamp inherit it.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub objects: Vec<SampleRecord>,
}

impl Frame {
    pub fn new(frame_number: u64, timestamp: i64, objects: Vec<SampleRecord>) -> Self {
        Self {
            frame_number,
            timestamp: Some(timestamp),
            objects,
        }
    }
}

/// An ordered stream of frames.
///
/// `next_frame` returning `Ok(None)` ends the session. Implementations must
/// be cancel-safe: dropping the future before it completes must not lose a
/// frame.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, SourceError>>;

    /// Total frames, when known up front.
    fn total_frames(&self) -> Option<u64> {
        None
    }

    /// Short name for logs and status messages.
    fn name(&self) -> &str;
}

/// Which built-in source to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Replay,
    #[default]
    Mock,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replay" | "data" => Ok(SourceKind::Replay),
            "mock" | "simulated" => Ok(SourceKind::Mock),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Replay => f.write_str("replay"),
            SourceKind::Mock => f.write_str("mock"),
        }
    }
}

/// Everything needed to open a fresh source for each session.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Tracking JSON for [`SourceKind::Replay`].
    pub replay_file: Option<PathBuf>,
    /// Replace recorded timestamps with wall-clock time at emission.
    pub restamp: bool,
    pub mock: MockConfig,
}

impl SourceConfig {
    /// Replay `path`.
    pub fn replay(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Replay,
            replay_file: Some(path.into()),
            restamp: true,
            mock: MockConfig::default(),
        }
    }

    /// Random-walk simulation.
    pub fn mock(config: MockConfig) -> Self {
        Self {
            kind: SourceKind::Mock,
            mock: config,
            ..Default::default()
        }
    }

    /// Open a new source.
    pub fn open(&self) -> Result<Box<dyn FrameSource>, SourceError> {
        match self.kind {
            SourceKind::Replay => {
                let path = self.replay_file.as_ref().ok_or(SourceError::MissingFile)?;
                let source = ReplaySource::load(path)?.with_restamp(self.restamp);
                Ok(Box::new(source))
            }
            SourceKind::Mock => Ok(Box::new(MockSource::new(self.mock.clone()))),
        }
    }
}
