use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub mod defaults {
    // audio / banding
    pub const SAMPLE_RATE: u32 = 44_100;
    pub const BLOCK_LEN: usize = 2048;
    pub const BANDS: usize = 16;
    pub const MIN_HZ: f32 = 50.0;
    pub const BASS_CUTOFF_HZ: f32 = 160.0;

    // envelope
    pub const ATTACK: f32 = 0.2;
    pub const RELEASE: f32 = 0.4;
    pub const LOUD_ATTACK: f32 = 0.2;
    pub const LOUD_RELEASE: f32 = 0.4;
    pub const DELTA_HISTORY: f32 = 0.7;

    // bass beat detection
    pub const BASS_WEIGHT_EXP: f32 = 0.4;
    pub const FLUX_HISTORY: usize = 90;
    pub const FLUX_MIN_HISTORY: usize = 10;
    pub const FLUX_K_MAD: f32 = 4.0;
    pub const WARMUP_THRESHOLD: f32 = 1.0;
    pub const REFRACTORY_MS: u64 = 100;
    pub const MIN_ACTIVITY: f32 = 0.1;
    pub const PULSE_GAIN: f32 = 0.6;
    pub const PULSE_DECAY: f32 = 0.5;

    // hue / value
    pub const HUE_BAND_SPREAD: f32 = 0.67;
    pub const HUE_AMP_WOBBLE: f32 = 0.7;
    pub const HUE_DELTA_BLEND: f32 = 0.35;
    pub const VAL_BASE: f32 = 0.25;
    pub const VAL_AMP_BOOST: f32 = 0.85;
    pub const VAL_BAND_BOOST: f32 = 0.35;

    // ring shape
    pub const DEFORM_SCALE: f32 = 0.4;
    pub const BASS_EMPHASIS: f32 = 1.8;
    pub const BASS_EMPHASIS_BANDS: usize = 3;
    pub const REST_DEFORM_PULL: f32 = 0.9;
    pub const FEATHER_PX: f32 = 3.0;
    pub const INNER_RATIO: f32 = 0.5;
    pub const PULSE_STRENGTH: f32 = 0.2;
    pub const RING_MARGIN_PX: f32 = 14.0;
    pub const SAFETY: f32 = 0.03;
    pub const RADIUS_CLAMP_PX: f32 = 2.0;

    // render
    pub const INTERNAL_SIZE: usize = 320;
    pub const ANGLES: usize = 360;
    pub const FPS: u32 = 60;
    pub const BACKGROUND: [u8; 3] = [0x28, 0x28, 0x28];
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub block_len: usize,
    pub bands: usize,
    pub min_hz: f32,
    /// Upper band edge; `None` means Nyquist.
    pub max_hz: Option<f32>,
    pub bass_cutoff_hz: f32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            block_len: defaults::BLOCK_LEN,
            bands: defaults::BANDS,
            min_hz: defaults::MIN_HZ,
            max_hz: None,
            bass_cutoff_hz: defaults::BASS_CUTOFF_HZ,
        }
    }
}

impl AudioParams {
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    pub fn max_hz(&self) -> f32 {
        self.max_hz.unwrap_or_else(|| self.nyquist())
    }

    /// Take the rate the capture actually delivers. Returns the replaced
    /// rate when it differs.
    pub fn adopt_capture_rate(&mut self, rate: u32) -> Option<u32> {
        let previous = std::mem::replace(&mut self.sample_rate, rate);
        (previous != rate).then_some(previous)
    }
}

/// Attack/release weights are the weight kept on history, so smaller means faster.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvelopeParams {
    pub attack: f32,
    pub release: f32,
    pub loud_attack: f32,
    pub loud_release: f32,
    pub delta_history: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: defaults::ATTACK,
            release: defaults::RELEASE,
            loud_attack: defaults::LOUD_ATTACK,
            loud_release: defaults::LOUD_RELEASE,
            delta_history: defaults::DELTA_HISTORY,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BeatParams {
    pub bass_weight_exp: f32,
    pub history_len: usize,
    pub k_mad: f32,
    /// Threshold used until the history holds `FLUX_MIN_HISTORY` samples.
    pub warmup_threshold: f32,
    pub refractory_ms: u64,
    pub min_activity: f32,
    pub pulse_gain: f32,
    pub pulse_decay: f32,
}

impl Default for BeatParams {
    fn default() -> Self {
        Self {
            bass_weight_exp: defaults::BASS_WEIGHT_EXP,
            history_len: defaults::FLUX_HISTORY,
            k_mad: defaults::FLUX_K_MAD,
            warmup_threshold: defaults::WARMUP_THRESHOLD,
            refractory_ms: defaults::REFRACTORY_MS,
            min_activity: defaults::MIN_ACTIVITY,
            pulse_gain: defaults::PULSE_GAIN,
            pulse_decay: defaults::PULSE_DECAY,
        }
    }
}

impl BeatParams {
    pub fn refractory(&self) -> Duration {
        Duration::from_millis(self.refractory_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColorParams {
    pub hue_band_spread: f32,
    pub hue_amp_wobble: f32,
    pub hue_delta_blend: f32,
    pub value_base: f32,
    pub value_amp_boost: f32,
    pub value_band_boost: f32,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            hue_band_spread: defaults::HUE_BAND_SPREAD,
            hue_amp_wobble: defaults::HUE_AMP_WOBBLE,
            hue_delta_blend: defaults::HUE_DELTA_BLEND,
            value_base: defaults::VAL_BASE,
            value_amp_boost: defaults::VAL_AMP_BOOST,
            value_band_boost: defaults::VAL_BAND_BOOST,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RingParams {
    pub deform_scale: f32,
    pub bass_emphasis: f32,
    pub bass_emphasis_bands: usize,
    pub rest_pull: f32,
    pub feather_px: f32,
    pub inner_ratio: f32,
    pub pulse_strength: f32,
    pub ring_margin_px: f32,
    pub safety: f32,
    pub radius_clamp_px: f32,
}

impl Default for RingParams {
    fn default() -> Self {
        Self {
            deform_scale: defaults::DEFORM_SCALE,
            bass_emphasis: defaults::BASS_EMPHASIS,
            bass_emphasis_bands: defaults::BASS_EMPHASIS_BANDS,
            rest_pull: defaults::REST_DEFORM_PULL,
            feather_px: defaults::FEATHER_PX,
            inner_ratio: defaults::INNER_RATIO,
            pulse_strength: defaults::PULSE_STRENGTH,
            ring_margin_px: defaults::RING_MARGIN_PX,
            safety: defaults::SAFETY,
            radius_clamp_px: defaults::RADIUS_CLAMP_PX,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderParams {
    /// Side length of the square internal raster.
    pub size: usize,
    /// Full angular resolution; must be even.
    pub angles: usize,
    pub fps: u32,
    pub background: [u8; 3],
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            size: defaults::INTERNAL_SIZE,
            angles: defaults::ANGLES,
            fps: defaults::FPS,
            background: defaults::BACKGROUND,
        }
    }
}

/// Construction-time tunables for one visualizer instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisualizerConfig {
    pub audio: AudioParams,
    pub envelope: EnvelopeParams,
    pub beat: BeatParams,
    pub color: ColorParams,
    pub ring: RingParams,
    pub render: RenderParams,
}

impl VisualizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if audio.block_len < 2 {
            return Err(ConfigError::BlockTooShort(audio.block_len));
        }
        if audio.bands == 0 {
            return Err(ConfigError::NoBands);
        }
        let (min_hz, max_hz, nyquist) = (audio.min_hz, audio.max_hz(), audio.nyquist());
        if !(min_hz > 0.0 && min_hz < max_hz && max_hz <= nyquist) {
            return Err(ConfigError::BandRange { min_hz, max_hz, nyquist });
        }
        if !(audio.bass_cutoff_hz > 0.0) {
            return Err(ConfigError::BassCutoff(audio.bass_cutoff_hz));
        }

        let render = &self.render;
        if render.angles < 2 || render.angles % 2 != 0 {
            return Err(ConfigError::AngleResolution(render.angles));
        }
        if render.fps == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }

        let env = &self.envelope;
        unit_interval("attack", env.attack)?;
        unit_interval("release", env.release)?;
        unit_interval("loud_attack", env.loud_attack)?;
        unit_interval("loud_release", env.loud_release)?;
        unit_interval("delta_history", env.delta_history)?;

        let beat = &self.beat;
        unit_interval("pulse_decay", beat.pulse_decay)?;
        positive("k_mad", beat.k_mad)?;
        positive("pulse_gain", beat.pulse_gain)?;
        if beat.history_len < defaults::FLUX_MIN_HISTORY {
            return Err(ConfigError::HistoryTooShort {
                got: beat.history_len,
                min: defaults::FLUX_MIN_HISTORY,
            });
        }

        let ring = &self.ring;
        positive("feather_px", ring.feather_px)?;
        positive("deform_scale", ring.deform_scale)?;
        unit_interval("safety", ring.safety)?;
        unit_interval("rest_pull", ring.rest_pull)?;

        let max_allowed = self.max_allowed_radius();
        if render.size < 8
            || max_allowed <= ring.ring_margin_px
            || max_allowed <= ring.radius_clamp_px
        {
            return Err(ConfigError::SizeTooSmall(render.size));
        }
        Ok(())
    }

    /// Largest radius the ring may reach inside the internal raster.
    pub fn max_allowed_radius(&self) -> f32 {
        let center = (self.render.size / 2) as f32;
        center - self.ring.feather_px - 1.0
    }

    pub fn half_angles(&self) -> usize {
        self.render.angles / 2
    }
}

fn unit_interval(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Coefficient { name, value })
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(VisualizerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_odd_angle_resolution() {
        let mut config = VisualizerConfig::default();
        config.render.angles = 359;
        assert_eq!(config.validate(), Err(ConfigError::AngleResolution(359)));
    }

    #[test]
    fn rejects_zero_bands() {
        let mut config = VisualizerConfig::default();
        config.audio.bands = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoBands));
    }

    #[test]
    fn rejects_band_range_above_nyquist() {
        let mut config = VisualizerConfig::default();
        config.audio.max_hz = Some(30_000.0);
        assert!(matches!(config.validate(), Err(ConfigError::BandRange { .. })));
    }

    #[test]
    fn rejects_coefficient_of_one() {
        let mut config = VisualizerConfig::default();
        config.envelope.release = 1.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Coefficient { name: "release", value: 1.0 })
        );
    }

    #[test]
    fn rejects_tiny_raster() {
        let mut config = VisualizerConfig::default();
        config.render.size = 32;
        assert_eq!(config.validate(), Err(ConfigError::SizeTooSmall(32)));
    }

    #[test]
    fn capture_rate_replaces_configured_rate() {
        let mut audio = AudioParams::default();
        assert_eq!(audio.adopt_capture_rate(44_100), None);
        assert_eq!(audio.adopt_capture_rate(48_000), Some(44_100));
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.nyquist(), 24_000.0);
    }

    #[test]
    fn max_allowed_radius_matches_feather() {
        let config = VisualizerConfig::default();
        assert_eq!(config.max_allowed_radius(), 156.0);
        assert_eq!(config.half_angles(), 180);
    }
}
