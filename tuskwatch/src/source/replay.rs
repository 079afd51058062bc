//! Replay of recorded tracking data.

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Frame, FrameSource, NearestNeighborAssigner, SourceError};
use crate::BoxFuture;

/// Recording metadata. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayMetadata {
    #[serde(default)]
    pub total_frames: Option<u64>,
    /// Frame rate of the source video.
    #[serde(default)]
    pub fps: Option<f64>,
    /// Length of the source video in seconds.
    #[serde(default)]
    pub video_duration: Option<f64>,
    #[serde(default)]
    pub camera_config: Option<serde_json::Value>,
}

/// A recorded tracking file: `{"metadata": {...}, "frames": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingDataFile {
    #[serde(default)]
    pub metadata: ReplayMetadata,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

/// Emits the frames of a [`TrackingDataFile`] in order.
#[derive(Debug)]
pub struct ReplaySource {
    name: String,
    metadata: ReplayMetadata,
    frames: VecDeque<Frame>,
    total: u64,
    emitted: u64,
    restamp: bool,
    assigner: NearestNeighborAssigner,
}

impl ReplaySource {
    /// Reads and parses a tracking file.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data: TrackingDataFile =
            serde_json::from_str(&contents).map_err(|source| SourceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            frames = data.frames.len(),
            fps = data.metadata.fps.unwrap_or(30.0),
            duration_secs = data.metadata.video_duration.unwrap_or(0.0),
            size_kb = contents.len() / 1024,
            "Tracking data loaded"
        );

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "replay".to_string());
        Ok(Self::from_data(data).with_name(name))
    }

    /// Replays in-memory data.
    pub fn from_data(data: TrackingDataFile) -> Self {
        let total = data.frames.len() as u64;
        Self {
            name: "replay".to_string(),
            metadata: data.metadata,
            frames: data.frames.into(),
            total,
            emitted: 0,
            restamp: false,
            assigner: NearestNeighborAssigner::default(),
        }
    }

    /// Replace recorded timestamps with the wall-clock time of emission.
    pub fn with_restamp(mut self, restamp: bool) -> Self {
        self.restamp = restamp;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_assigner(mut self, assigner: NearestNeighborAssigner) -> Self {
        self.assigner = assigner;
        self
    }

    pub fn metadata(&self) -> &ReplayMetadata {
        &self.metadata
    }

    fn prepare(&mut self, mut frame: Frame) -> Frame {
        self.emitted += 1;
        if frame.frame_number == 0 {
            frame.frame_number = self.emitted;
        }
        if self.restamp {
            let now = crate::now_millis();
            frame.timestamp = Some(now);
            for object in &mut frame.objects {
                object.timestamp = Some(now);
            }
        }
        self.assigner.assign(&mut frame.objects);
        frame
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, SourceError>> {
        let next = self.frames.pop_front().map(|frame| self.prepare(frame));
        Box::pin(async move { Ok(next) })
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.total)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::EntityId;
    use std::io::Write;

    const RECORDING: &str = r#"{
        "metadata": {"total_frames": 3, "fps": 30.0, "video_duration": 0.1},
        "frames": [
            {"objects": [{"id": 1, "x": 10, "y": 20, "timestamp": 1000, "confidence": 0.9}]},
            {"objects": [{"x": 500, "y": 500}]},
            {"frame_number": 9, "objects": []}
        ]
    }"#;

    fn write_recording() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RECORDING.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_replays_frames_in_order() {
        let file = write_recording();
        let mut source = ReplaySource::load(file.path()).unwrap();
        assert_eq!(source.total_frames(), Some(3));
        assert_eq!(source.metadata().fps, Some(30.0));

        let first = source.next_frame().await.unwrap().unwrap();
        assert_eq!(first.frame_number, 1);
        assert_eq!(first.objects[0].timestamp, Some(1000));

        let second = source.next_frame().await.unwrap().unwrap();
        assert_eq!(second.frame_number, 2);
        assert_eq!(second.objects[0].id, Some(EntityId::from(2)));

        let third = source.next_frame().await.unwrap().unwrap();
        assert_eq!(third.frame_number, 9);

        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restamp_overrides_recorded_time() {
        let file = write_recording();
        let mut source = ReplaySource::load(file.path()).unwrap().with_restamp(true);

        let before = crate::now_millis();
        let frame = source.next_frame().await.unwrap().unwrap();
        let stamped = frame.objects[0].timestamp.unwrap();
        assert!(stamped >= before);
        assert_eq!(frame.timestamp, Some(stamped));
    }

    #[test]
    fn test_missing_file() {
        let err = ReplaySource::load(Path::new("/nonexistent/tracking.json")).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let err = ReplaySource::load(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let data: TrackingDataFile = serde_json::from_str("{}").unwrap();
        let source = ReplaySource::from_data(data);
        assert_eq!(source.total_frames(), Some(0));
    }
}
