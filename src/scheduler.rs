use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::audio::capture::{AudioCapture, CaptureSession};
use crate::error::{RunError, SinkError};
use crate::sink::FrameSink;
use crate::visualizer::Visualizer;

const MIN_SLEEP: Duration = Duration::from_millis(1);
/// Overruns after the first are logged once per this many.
const OVERRUN_LOG_EVERY: u64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep between ticks to hold the target rate; timestamps are wall clock.
    RealTime,
    /// Run as fast as possible; tick `n` is stamped `n / fps`.
    Offline,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub beats: u64,
    /// Ticks whose work took longer than one frame interval.
    pub overruns: u64,
}

/// How long to sleep after a tick that took `elapsed`.
pub fn pacing_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(MIN_SLEEP)
}

/// Drives the visualizer at a fixed frame rate and fans frames out to sinks.
pub struct FrameScheduler {
    pacing: Pacing,
    fps: u32,
    max_frames: Option<u64>,
    progress: bool,
    stop: Arc<AtomicBool>,
}

impl FrameScheduler {
    pub fn new(fps: u32, pacing: Pacing) -> Self {
        Self {
            pacing,
            fps: fps.max(1),
            max_frames: None,
            progress: false,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_frame_limit(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Show a progress bar in offline mode.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Setting the returned flag stops the loop before its next tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps as f64)
    }

    fn timestamp(&self, frame: u64, start: Instant) -> Duration {
        match self.pacing {
            Pacing::RealTime => start.elapsed(),
            Pacing::Offline => Duration::from_secs_f64(frame as f64 / self.fps as f64),
        }
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.progress || self.pacing != Pacing::Offline {
            return ProgressBar::hidden();
        }
        let total = match (total, self.max_frames) {
            (Some(t), Some(m)) => t.min(m),
            (t, m) => t.or(m).unwrap_or(0),
        };
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);
        pb
    }

    /// Run until the capture ends, the frame limit is reached, or the stop
    /// flag is set. The capture is released on every exit path. Sinks are
    /// finished after a clean run and dropped after a failed one.
    pub fn run<C: AudioCapture>(
        &self,
        capture: C,
        visualizer: &mut Visualizer,
        mut sinks: Vec<Box<dyn FrameSink>>,
    ) -> Result<RunSummary, RunError> {
        let mut session = CaptureSession::new(capture);
        let pb = self.progress_bar(session.remaining_blocks());

        let result = self.tick_loop(&mut session, visualizer, &mut sinks, &pb);
        pb.finish_and_clear();
        session.release();

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                log::error!("Frame loop failed: {e}");
                return Err(e);
            }
        };

        let mut first_error: Option<SinkError> = None;
        for sink in sinks {
            if let Err(e) = sink.finish() {
                log::error!("Sink failed to finish: {e}");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        log::info!(
            "Stopped after {} frames, {} beats, {} overruns",
            summary.frames,
            summary.beats,
            summary.overruns
        );
        Ok(summary)
    }

    fn tick_loop<C: AudioCapture>(
        &self,
        capture: &mut CaptureSession<C>,
        visualizer: &mut Visualizer,
        sinks: &mut [Box<dyn FrameSink>],
        pb: &ProgressBar,
    ) -> Result<RunSummary, RunError> {
        let interval = self.interval();
        let start = Instant::now();
        let mut summary = RunSummary::default();

        log::info!(
            "Frame loop started: {} fps, {:?} pacing, {} sink(s)",
            self.fps,
            self.pacing,
            sinks.len()
        );

        loop {
            if self.stop.load(Ordering::Relaxed) {
                log::info!("Stop requested");
                break;
            }
            if self.max_frames.is_some_and(|max| summary.frames >= max) {
                log::info!("Frame limit reached");
                break;
            }

            let tick_start = Instant::now();
            let Some(block) = capture.read_block()? else {
                log::info!("End of audio stream");
                break;
            };

            let now = self.timestamp(summary.frames, start);
            let frame = visualizer.process(&block, now);
            for sink in sinks.iter_mut() {
                sink.present(&frame)?;
            }

            summary.frames += 1;
            if frame.beat {
                summary.beats += 1;
            }
            pb.set_position(summary.frames);

            if self.pacing == Pacing::RealTime {
                let elapsed = tick_start.elapsed();
                if elapsed > interval {
                    summary.overruns += 1;
                    if summary.overruns % OVERRUN_LOG_EVERY == 1 {
                        log::warn!(
                            "Frame {} took {:.1}ms (budget {:.1}ms), {} overrun(s) so far",
                            summary.frames,
                            elapsed.as_secs_f64() * 1e3,
                            interval.as_secs_f64() * 1e3,
                            summary.overruns
                        );
                    }
                }
                std::thread::sleep(pacing_delay(interval, elapsed));
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::CapturedBlock;
    use crate::error::CaptureError;
    use crate::params::VisualizerConfig;
    use crate::render::frame::FrameOutput;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct ScriptedCapture {
        blocks: usize,
        fail_at: Option<usize>,
        served: usize,
        released: Rc<Cell<u32>>,
        stop_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl ScriptedCapture {
        fn new(blocks: usize, released: &Rc<Cell<u32>>) -> Self {
            Self {
                blocks,
                fail_at: None,
                served: 0,
                released: released.clone(),
                stop_after: None,
            }
        }
    }

    impl AudioCapture for ScriptedCapture {
        fn sample_rate(&self) -> u32 {
            44_100
        }

        fn read_block(&mut self) -> Result<Option<CapturedBlock>, CaptureError> {
            if self.fail_at == Some(self.served) {
                return Err(CaptureError::Timeout(Duration::from_millis(92)));
            }
            if self.served >= self.blocks {
                return Ok(None);
            }
            self.served += 1;
            if let Some((n, flag)) = &self.stop_after {
                if self.served >= *n {
                    flag.store(true, Ordering::Relaxed);
                }
            }
            Ok(Some(CapturedBlock::mono(vec![0.0; 256])))
        }

        fn release(&mut self) {
            self.released.set(self.released.get() + 1);
        }

        fn remaining_blocks(&self) -> Option<u64> {
            Some((self.blocks - self.served) as u64)
        }
    }

    #[derive(Default)]
    struct Recorder {
        timestamps: Vec<Duration>,
        finished: bool,
    }

    struct RecordingSink(Rc<RefCell<Recorder>>);

    impl FrameSink for RecordingSink {
        fn present(&mut self, frame: &FrameOutput) -> Result<(), SinkError> {
            self.0.borrow_mut().timestamps.push(frame.timestamp);
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), SinkError> {
            self.0.borrow_mut().finished = true;
            Ok(())
        }
    }

    struct BrokenSink;

    impl FrameSink for BrokenSink {
        fn present(&mut self, _: &FrameOutput) -> Result<(), SinkError> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into())
        }

        fn finish(self: Box<Self>) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn visualizer() -> Visualizer {
        let mut config = VisualizerConfig::default();
        config.audio.block_len = 256;
        config.render.size = 64;
        Visualizer::new(config).unwrap()
    }

    fn recorder() -> (Rc<RefCell<Recorder>>, Box<dyn FrameSink>) {
        let rec = Rc::new(RefCell::new(Recorder::default()));
        (rec.clone(), Box::new(RecordingSink(rec)))
    }

    #[test]
    fn pacing_sleeps_the_rest_of_the_interval() {
        let interval = Duration::from_millis(16);
        assert_eq!(pacing_delay(interval, Duration::from_millis(6)), Duration::from_millis(10));
        assert_eq!(pacing_delay(interval, Duration::from_millis(40)), MIN_SLEEP);
        assert_eq!(pacing_delay(interval, interval), MIN_SLEEP);
    }

    #[test]
    fn offline_run_ends_at_end_of_stream() {
        let released = Rc::new(Cell::new(0));
        let (rec, sink) = recorder();
        let scheduler = FrameScheduler::new(60, Pacing::Offline);
        let summary = scheduler
            .run(ScriptedCapture::new(5, &released), &mut visualizer(), vec![sink])
            .unwrap();

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.beats, 0);
        assert!(released.get() >= 1);
        let rec = rec.borrow();
        assert!(rec.finished);
        assert_eq!(rec.timestamps[0], Duration::ZERO);
        assert_eq!(rec.timestamps[3], Duration::from_secs_f64(3.0 / 60.0));
    }

    #[test]
    fn frames_fan_out_to_every_sink() {
        let released = Rc::new(Cell::new(0));
        let (a, sink_a) = recorder();
        let (b, sink_b) = recorder();
        FrameScheduler::new(60, Pacing::Offline)
            .run(ScriptedCapture::new(3, &released), &mut visualizer(), vec![sink_a, sink_b])
            .unwrap();
        assert_eq!(a.borrow().timestamps.len(), 3);
        assert_eq!(a.borrow().timestamps, b.borrow().timestamps);
    }

    #[test]
    fn frame_limit_stops_early() {
        let released = Rc::new(Cell::new(0));
        let (rec, sink) = recorder();
        let summary = FrameScheduler::new(60, Pacing::Offline)
            .with_frame_limit(Some(4))
            .run(ScriptedCapture::new(100, &released), &mut visualizer(), vec![sink])
            .unwrap();
        assert_eq!(summary.frames, 4);
        assert_eq!(rec.borrow().timestamps.len(), 4);
    }

    #[test]
    fn stop_flag_is_checked_before_each_tick() {
        let released = Rc::new(Cell::new(0));
        let scheduler = FrameScheduler::new(60, Pacing::Offline);
        let mut capture = ScriptedCapture::new(100, &released);
        capture.stop_after = Some((2, scheduler.stop_handle()));
        let summary = scheduler.run(capture, &mut visualizer(), Vec::new()).unwrap();
        assert_eq!(summary.frames, 2);
        assert!(released.get() >= 1);
    }

    #[test]
    fn capture_failure_is_fatal_and_releases() {
        let released = Rc::new(Cell::new(0));
        let (rec, sink) = recorder();
        let mut capture = ScriptedCapture::new(100, &released);
        capture.fail_at = Some(3);
        let result = FrameScheduler::new(60, Pacing::Offline).run(capture, &mut visualizer(), vec![sink]);

        assert!(matches!(result, Err(RunError::Capture(CaptureError::Timeout(_)))));
        assert!(released.get() >= 1);
        let rec = rec.borrow();
        assert_eq!(rec.timestamps.len(), 3);
        assert!(!rec.finished);
    }

    #[test]
    fn sink_failure_is_fatal() {
        let released = Rc::new(Cell::new(0));
        let result = FrameScheduler::new(60, Pacing::Offline).run(
            ScriptedCapture::new(10, &released),
            &mut visualizer(),
            vec![Box::new(BrokenSink)],
        );
        assert!(matches!(result, Err(RunError::Sink(SinkError::Io(_)))));
        assert!(released.get() >= 1);
    }

    #[test]
    fn realtime_holds_the_frame_rate() {
        let released = Rc::new(Cell::new(0));
        let begin = Instant::now();
        let summary = FrameScheduler::new(100, Pacing::RealTime)
            .run(ScriptedCapture::new(5, &released), &mut visualizer(), Vec::new())
            .unwrap();
        assert_eq!(summary.frames, 5);
        assert!(begin.elapsed() >= Duration::from_millis(40));
    }
}
