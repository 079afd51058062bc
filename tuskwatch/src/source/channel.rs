//! Frames pushed by an external detector.

use tokio::sync::mpsc;

use super::{Frame, FrameSource, SourceError};
use crate::BoxFuture;

/// Receives frames from a channel; ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<Frame>,
    received: u64,
}

impl ChannelSource {
    /// Creates a source and the sender that feeds it.
    ///
    /// The channel is bounded; a detector that outpaces the session waits
    /// rather than dropping frames.
    pub fn new(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            sender,
            Self {
                receiver,
                received: 0,
            },
        )
    }
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, SourceError>> {
        Box::pin(async move {
            let frame = self.receiver.recv().await.map(|mut frame| {
                self.received += 1;
                if frame.frame_number == 0 {
                    frame.frame_number = self.received;
                }
                frame
            });
            Ok(frame)
        })
    }

    fn name(&self) -> &str {
        "channel"
    }
}
