use super::stats::{median, percentile};
use crate::params::EnvelopeParams;

const NORM_EPSILON: f32 = 1e-8;

/// Map raw band magnitudes onto [0, 1] relative to this tick's own spread:
/// the median maps to 0 and the 90th percentile to 1.
pub fn robust_normalize(magnitudes: &[f32]) -> Vec<f32> {
    let med = median(magnitudes) + NORM_EPSILON;
    let p90 = percentile(magnitudes, 90.0) + NORM_EPSILON;
    let spread = (p90 - med).max(0.0) + NORM_EPSILON;
    magnitudes
        .iter()
        .map(|&value| ((value - med) / spread).clamp(0.0, 1.0))
        .collect()
}

/// Blend `current` toward `target`; `history` is the weight kept on `current`.
fn blend(current: f32, target: f32, history: f32) -> f32 {
    history * current + (1.0 - history) * target
}

/// Per-band attack/release envelopes plus a scalar activity level.
#[derive(Clone, Debug)]
pub struct EnvelopeTracker {
    params: EnvelopeParams,
    levels: Vec<f32>,
    prev_levels: Vec<f32>,
    delta: Vec<f32>,
    loudness: f32,
}

impl EnvelopeTracker {
    pub fn new(bands: usize, params: EnvelopeParams) -> Self {
        Self {
            params,
            levels: vec![0.0; bands],
            prev_levels: vec![0.0; bands],
            delta: vec![0.0; bands],
            loudness: 0.0,
        }
    }

    /// Advance one tick with normalized band values; returns the new activity.
    pub fn update(&mut self, normalized: &[f32]) -> f32 {
        let p = &self.params;
        for (level, &target) in self.levels.iter_mut().zip(normalized) {
            let history = if target > *level { p.attack } else { p.release };
            *level = blend(*level, target, history).clamp(0.0, 1.0);
        }

        for ((delta, &level), prev) in self
            .delta
            .iter_mut()
            .zip(&self.levels)
            .zip(self.prev_levels.iter_mut())
        {
            let rise = (level - *prev).clamp(0.0, 1.0);
            *delta = blend(*delta, rise, p.delta_history);
            *prev = level;
        }

        let loud_now = if self.levels.is_empty() {
            0.0
        } else {
            (self.levels.iter().map(|l| l * l).sum::<f32>() / self.levels.len() as f32).sqrt()
        };
        let history = if loud_now > self.loudness {
            p.loud_attack
        } else {
            p.loud_release
        };
        self.loudness = blend(self.loudness, loud_now, history);
        self.activity()
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn delta(&self) -> &[f32] {
        &self.delta
    }

    pub fn activity(&self) -> f32 {
        self.loudness.clamp(0.0, 1.0)
    }
}
