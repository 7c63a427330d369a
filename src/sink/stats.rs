use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use serde::Serialize;

use super::FrameSink;
use crate::error::SinkError;
use crate::render::frame::FrameOutput;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub frames: u64,
    pub beats: u64,
    /// Timestamps of detected beats, in seconds.
    pub beat_times: Vec<f64>,
    pub mean_pulse_radius: f32,
    pub mean_activity: f32,
    pub peak_activity: f32,
    pub duration_secs: f64,
}

/// Records frame statistics instead of displaying anything.
#[derive(Default)]
pub struct StatsSink {
    stats: FrameStats,
    pulse_sum: f64,
    activity_sum: f64,
    output: Option<PathBuf>,
}

impl StatsSink {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    #[allow(dead_code)]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

impl FrameSink for StatsSink {
    fn present(&mut self, frame: &FrameOutput) -> Result<(), SinkError> {
        let s = &mut self.stats;
        s.frames += 1;
        if frame.beat {
            s.beats += 1;
            s.beat_times.push(frame.timestamp.as_secs_f64());
        }
        s.peak_activity = s.peak_activity.max(frame.activity);
        s.duration_secs = frame.timestamp.as_secs_f64();

        self.pulse_sum += frame.pulse_radius as f64;
        self.activity_sum += frame.activity as f64;
        s.mean_pulse_radius = (self.pulse_sum / s.frames as f64) as f32;
        s.mean_activity = (self.activity_sum / s.frames as f64) as f32;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        let s = &self.stats;
        log::info!(
            "Stats: {} frames, {} beats, mean pulse radius {:.1}px, mean activity {:.3}",
            s.frames,
            s.beats,
            s.mean_pulse_radius,
            s.mean_activity
        );
        if let Some(path) = &self.output {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, s)?;
            log::info!("Wrote stats to {}", path.display());
        }
        Ok(())
    }
}
