use std::time::Duration;

use crate::audio::bands::{BandTable, SpectralMapper};
use crate::audio::beat::BassBeatDetector;
use crate::audio::capture::{downmix, CapturedBlock};
use crate::audio::envelope::{robust_normalize, EnvelopeTracker};
use crate::error::ConfigError;
use crate::params::VisualizerConfig;
use crate::render::color::ColorSynth;
use crate::render::frame::{FrameOutput, RadialCompositor};
use crate::render::mirror::{build_profile, AngleInterpolationCache};

/// The per-tick pipeline from an audio block to a finished frame. Owns one
/// instance of every stateful stage; all tables are built once in `new`.
pub struct Visualizer {
    config: VisualizerConfig,
    mapper: SpectralMapper,
    envelope: EnvelopeTracker,
    beat: BassBeatDetector,
    synth: ColorSynth,
    cache: AngleInterpolationCache,
    compositor: RadialCompositor,
}

impl Visualizer {
    pub fn new(config: VisualizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let table = BandTable::new(&config.audio)?;
        let bands = table.bands();
        let beat = BassBeatDetector::new(&table, config.audio.bass_cutoff_hz, config.beat.clone());
        let mapper = SpectralMapper::new(table);

        log::info!(
            "Visualizer ready: {} bands over {:.0}-{:.0} Hz, block {}, {}px / {} angles",
            bands,
            config.audio.min_hz,
            config.audio.max_hz(),
            config.audio.block_len,
            config.render.size,
            config.render.angles
        );

        Ok(Self {
            envelope: EnvelopeTracker::new(bands, config.envelope.clone()),
            synth: ColorSynth::new(bands, config.color.clone(), config.ring.clone()),
            cache: AngleInterpolationCache::new(bands, config.half_angles()),
            compositor: RadialCompositor::new(&config),
            mapper,
            beat,
            config,
        })
    }

    pub fn process(&mut self, block: &CapturedBlock, now: Duration) -> FrameOutput {
        self.process_block(&block.samples, block.channels, now)
    }

    /// Run one tick on interleaved `samples`. `now` is the time since the
    /// stream started and drives the beat refractory interval.
    pub fn process_block(&mut self, samples: &[f32], channels: usize, now: Duration) -> FrameOutput {
        let mono = downmix(samples, channels);
        let magnitudes = self.mapper.band_magnitudes(&mono);
        let normalized = robust_normalize(&magnitudes);

        let activity = self.envelope.update(&normalized);
        let beat = self.beat.process(&normalized, activity, now);

        let shape = self
            .synth
            .synthesize(self.envelope.levels(), self.envelope.delta(), activity);
        let profile = build_profile(&self.cache, &shape);

        FrameOutput {
            size: self.config.render.size,
            pixels: self.compositor.compose(&profile),
            pulse_radius: self.compositor.pulse_radius(beat.pulse),
            beat: beat.triggered,
            activity,
            timestamp: now,
        }
    }
}
