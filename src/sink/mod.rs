pub mod ffmpeg;
pub mod stats;

use crate::error::SinkError;
use crate::render::frame::FrameOutput;

/// The display collaborator. The scheduler presents every frame to each sink
/// in turn and finishes them once the run ends.
pub trait FrameSink {
    fn present(&mut self, frame: &FrameOutput) -> Result<(), SinkError>;

    fn finish(self: Box<Self>) -> Result<(), SinkError>;
}
