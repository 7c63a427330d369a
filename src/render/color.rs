use std::f32::consts::TAU;

use crate::params::{ColorParams, RingParams};

const CENTROID_EPSILON: f32 = 1e-6;
const DEFORM_EPSILON: f32 = 1e-6;

/// Per-band color (RGB in 0..=255, unquantized) and radial deformation in [-1, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct BandShape {
    pub colors: Vec<[f32; 3]>,
    pub deform: Vec<f32>,
}

/// HSV in [0, 1] to RGB in [0, 255].
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = (h6.floor() as i32).rem_euclid(6);
    let f = h6 - h6.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [r, g, b].map(|c| c.clamp(0.0, 1.0) * 255.0)
}

/// Hue in [0, 1) of the level-weighted centroid of bands placed on a circle.
fn centroid_hue(weights: &[f32]) -> f32 {
    let n = weights.len().max(1) as f32;
    let (mut x, mut y) = (0.0f32, 0.0f32);
    for (i, w) in weights.iter().enumerate() {
        let (sin, cos) = (TAU * i as f32 / n).sin_cos();
        let w = w + CENTROID_EPSILON;
        x += w * cos;
        y += w * sin;
    }
    y.atan2(x).rem_euclid(TAU) / TAU
}

/// Interpolate between two hues along the shorter arc of the hue circle.
pub fn hue_lerp(from: f32, to: f32, t: f32) -> f32 {
    let d = (to - from + 0.5).rem_euclid(1.0) - 0.5;
    (from + t * d).rem_euclid(1.0)
}

/// Stateless band-to-color/deformation mapping.
pub struct ColorSynth {
    color: ColorParams,
    ring: RingParams,
    /// `1/sqrt(1+i)` normalized to a peak of 1, with the lowest bands emphasized.
    deform_weights: Vec<f32>,
}

impl ColorSynth {
    pub fn new(bands: usize, color: ColorParams, ring: RingParams) -> Self {
        let mut deform_weights: Vec<f32> =
            (0..bands).map(|i| 1.0 / (1.0 + i as f32).sqrt()).collect();
        let peak = deform_weights.iter().copied().fold(0.0f32, f32::max);
        if peak > 0.0 {
            deform_weights.iter_mut().for_each(|w| *w /= peak);
        }
        for w in deform_weights.iter_mut().take(ring.bass_emphasis_bands) {
            *w *= ring.bass_emphasis;
        }
        Self {
            color,
            ring,
            deform_weights,
        }
    }

    pub fn synthesize(&self, levels: &[f32], delta: &[f32], activity: f32) -> BandShape {
        let hues = self.band_hues(levels, delta);
        let c = &self.color;
        let colors = hues
            .iter()
            .zip(levels)
            .map(|(&h, &level)| {
                let v = (c.value_base + c.value_amp_boost * activity + c.value_band_boost * level)
                    .clamp(0.0, 1.0);
                hsv_to_rgb(h, 1.0, v)
            })
            .collect();

        BandShape {
            colors,
            deform: self.deformation(levels, activity),
        }
    }

    fn band_hues(&self, levels: &[f32], delta: &[f32]) -> Vec<f32> {
        let c = &self.color;
        let hue_energy = centroid_hue(levels);
        let hue_change = centroid_hue(delta);
        let hue_base = ((1.0 - c.hue_delta_blend) * hue_energy + c.hue_delta_blend * hue_change)
            .rem_euclid(1.0);

        let last = levels.len().saturating_sub(1).max(1) as f32;
        levels
            .iter()
            .enumerate()
            .map(|(i, &level)| {
                let h0 = (hue_base + c.hue_band_spread * (i as f32 / last)).rem_euclid(1.0);
                let h1 = (h0 + c.hue_amp_wobble * level).rem_euclid(1.0);
                hue_lerp(h0, h1, level)
            })
            .collect()
    }

    fn deformation(&self, levels: &[f32], activity: f32) -> Vec<f32> {
        if levels.is_empty() {
            return Vec::new();
        }
        let mean = levels.iter().sum::<f32>() / levels.len() as f32;
        let mut deform: Vec<f32> = levels
            .iter()
            .zip(&self.deform_weights)
            .map(|(level, w)| w * (level - mean))
            .collect();

        let peak = deform.iter().fold(0.0f32, |m, d| m.max(d.abs()));
        if peak > DEFORM_EPSILON {
            deform.iter_mut().for_each(|d| *d /= peak);
        }
        let rest = 1.0 - self.ring.rest_pull * (1.0 - activity.clamp(0.0, 1.0));
        deform.iter_mut().for_each(|d| *d *= rest);
        deform
    }
}
