use super::color::BandShape;

/// Source bands and blend fraction for every half-angle slot.
#[derive(Clone, Debug, PartialEq)]
pub struct AngleInterpolationCache {
    i0: Vec<usize>,
    i1: Vec<usize>,
    t: Vec<f32>,
}

impl AngleInterpolationCache {
    pub fn new(bands: usize, half: usize) -> Self {
        let bands = bands.max(1);
        let per_band = half as f32 / bands as f32;
        let mut i0 = Vec::with_capacity(half);
        let mut i1 = Vec::with_capacity(half);
        let mut t = Vec::with_capacity(half);
        for slot in 0..half {
            let pos = slot as f32 / per_band;
            let lower = pos.floor();
            let band = lower as usize % bands;
            i0.push(band);
            i1.push((band + 1) % bands);
            t.push(pos - lower);
        }
        Self { i0, i1, t }
    }

    pub fn half(&self) -> usize {
        self.t.len()
    }

    pub fn slot(&self, slot: usize) -> (usize, usize, f32) {
        (self.i0[slot], self.i1[slot], self.t[slot])
    }
}

/// Full-resolution per-angle colors and deformation.
#[derive(Clone, Debug, PartialEq)]
pub struct AngularProfile {
    pub colors: Vec<[u8; 3]>,
    pub deform: Vec<f32>,
}

impl AngularProfile {
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.deform.len()
    }

    pub fn max_abs_deform(&self) -> f32 {
        self.deform.iter().fold(0.0f32, |m, d| m.max(d.abs()))
    }
}

/// The ring is left/right symmetric: only `half` slots are interpolated and
/// the second half is the first one reversed.
pub fn build_profile(cache: &AngleInterpolationCache, shape: &BandShape) -> AngularProfile {
    let half = cache.half();
    let mut colors = Vec::with_capacity(half * 2);
    let mut deform = Vec::with_capacity(half * 2);

    for slot in 0..half {
        let (a, b, t) = cache.slot(slot);
        let (ca, cb) = (shape.colors[a], shape.colors[b]);
        colors.push([0, 1, 2].map(|c| (ca[c] * (1.0 - t) + cb[c] * t) as u8));
        deform.push(shape.deform[a] * (1.0 - t) + shape.deform[b] * t);
    }

    colors.extend_from_within(..half);
    colors[half..].reverse();
    deform.extend_from_within(..half);
    deform[half..].reverse();

    AngularProfile { colors, deform }
}
