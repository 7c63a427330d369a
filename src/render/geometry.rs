use std::f32::consts::TAU;

/// Per-pixel polar coordinates of a square raster around its center pixel.
#[derive(Clone, Debug)]
pub struct PolarGeometry {
    size: usize,
    angles: usize,
    radius: Vec<f32>,
    angle_index: Vec<u32>,
}

impl PolarGeometry {
    pub fn new(size: usize, angles: usize) -> Self {
        let center = (size / 2) as f32;
        let scale = angles as f32 / TAU;
        let last = angles.saturating_sub(1) as u32;

        let mut radius = Vec::with_capacity(size * size);
        let mut angle_index = Vec::with_capacity(size * size);
        for y in 0..size {
            let dy = y as f32 - center;
            for x in 0..size {
                let dx = x as f32 - center;
                radius.push(dx.hypot(dy));
                let theta = dy.atan2(dx).rem_euclid(TAU);
                angle_index.push(((theta * scale) as u32).min(last));
            }
        }

        Self {
            size,
            angles,
            radius,
            angle_index,
        }
    }

    #[allow(dead_code)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[allow(dead_code)]
    pub fn angles(&self) -> usize {
        self.angles
    }

    pub fn radius(&self) -> &[f32] {
        &self.radius
    }

    pub fn angle_index(&self) -> &[u32] {
        &self.angle_index
    }

    #[allow(dead_code)]
    pub fn pixel(&self, x: usize, y: usize) -> (f32, u32) {
        let i = y * self.size + x;
        (self.radius[i], self.angle_index[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pixel_has_zero_radius() {
        let geo = PolarGeometry::new(320, 360);
        assert_eq!(geo.pixel(160, 160), (0.0, 0));
    }

    #[test]
    fn angle_indices_follow_image_axes() {
        let geo = PolarGeometry::new(320, 360);
        let near = |(x, y): (usize, usize), expected: i64| {
            let got = geo.pixel(x, y).1 as i64;
            assert!((got - expected).abs() <= 1, "({x}, {y}) -> {got}, want {expected}");
        };
        // +x is angle 0 and +y (down the raster) is a quarter turn.
        assert_eq!(geo.pixel(300, 160).1, 0);
        near((160, 300), 90);
        near((20, 160), 180);
        near((160, 20), 270);
        assert_eq!(geo.pixel(300, 160).0, 140.0);
    }

    #[test]
    fn every_index_is_in_range() {
        let geo = PolarGeometry::new(64, 90);
        assert!(geo.angle_index().iter().all(|&i| (i as usize) < geo.angles()));
        assert_eq!(geo.radius().len(), 64 * 64);
    }
}
