use std::time::Duration;

use super::geometry::PolarGeometry;
use super::mirror::AngularProfile;
use crate::params::{RingParams, VisualizerConfig};

/// One finished tick: an RGB raster at the internal resolution plus the
/// radius of the center pulse, in internal pixels.
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub size: usize,
    /// Row-major RGB, `size * size * 3` bytes.
    pub pixels: Vec<u8>,
    pub pulse_radius: f32,
    pub beat: bool,
    pub activity: f32,
    pub timestamp: Duration,
}

impl FrameOutput {
    #[allow(dead_code)]
    pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.size + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }
}

/// Soft-edged alpha compositing of the deformed ring over polar geometry.
pub struct RadialCompositor {
    geometry: PolarGeometry,
    ring: RingParams,
    background: [u8; 3],
    max_allowed: f32,
}

impl RadialCompositor {
    pub fn new(config: &VisualizerConfig) -> Self {
        Self {
            geometry: PolarGeometry::new(config.render.size, config.render.angles),
            ring: config.ring.clone(),
            background: config.render.background,
            max_allowed: config.max_allowed_radius(),
        }
    }

    #[allow(dead_code)]
    pub fn max_allowed_radius(&self) -> f32 {
        self.max_allowed
    }

    /// Per-angle ring radius. The base radius shrinks with the current peak
    /// deformation so the most deformed angle still fits.
    pub fn target_radii(&self, profile: &AngularProfile) -> Vec<f32> {
        let scale = self.ring.deform_scale;
        let peak = profile.max_abs_deform();
        let den = (1.0 + scale * peak).max(1e-6);
        let base = self.max_allowed * (1.0 - self.ring.safety) / den;
        let ceiling = (self.max_allowed - self.ring.radius_clamp_px).max(0.0);
        profile
            .deform
            .iter()
            .map(|d| (base * (1.0 + scale * d)).clamp(0.0, ceiling))
            .collect()
    }

    pub fn pulse_radius(&self, pulse: f32) -> f32 {
        let base = self.max_allowed * self.ring.inner_ratio;
        let radius = base * (1.0 + self.ring.pulse_strength * pulse.min(1.0));
        radius.clamp(0.0, (self.max_allowed - self.ring.ring_margin_px).max(0.0))
    }

    /// Rasterize `profile` into a fresh RGB buffer.
    pub fn compose(&self, profile: &AngularProfile) -> Vec<u8> {
        let radii = self.target_radii(profile);
        let feather = self.ring.feather_px;
        let cutoff = self.max_allowed + feather;

        let mut pixels = Vec::with_capacity(self.geometry.radius().len() * 3);
        for (&r, &angle) in self.geometry.radius().iter().zip(self.geometry.angle_index()) {
            let angle = angle as usize;
            let alpha = if r <= cutoff {
                ((radii[angle] - r) / feather + 1.0).clamp(0.0, 1.0)
            } else {
                0.0
            };
            if alpha > 0.0 {
                let color = profile.colors[angle];
                pixels.extend(color.map(|c| (alpha * c as f32) as u8));
            } else {
                pixels.extend(self.background);
            }
        }
        pixels
    }
}
