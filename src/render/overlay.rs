use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage, RgbaImage};

use super::frame::FrameOutput;
use crate::error::SinkError;

const DISC_COLOR: [u8; 3] = [255, 255, 255];

/// Display-side finishing of a frame: bilinear upscale plus the center pulse
/// overlay, either a white disc or a logo scaled to the pulse diameter.
pub struct DisplayScaler {
    output_size: u32,
    logo: Option<RgbaImage>,
}

impl DisplayScaler {
    pub fn new(output_size: u32) -> Self {
        Self {
            output_size,
            logo: None,
        }
    }

    pub fn with_logo_file(self, path: &Path) -> Result<Self, SinkError> {
        let logo = image::open(path)?.to_rgba8();
        log::info!(
            "Loaded pulse logo {} ({}x{})",
            path.display(),
            logo.width(),
            logo.height()
        );
        Ok(self.with_logo(logo))
    }

    pub fn with_logo(mut self, logo: RgbaImage) -> Self {
        self.logo = Some(logo);
        self
    }

    pub fn output_size(&self) -> u32 {
        self.output_size
    }

    pub fn render(&self, frame: &FrameOutput) -> RgbImage {
        let size = frame.size as u32;
        let raw = frame.pixels.as_slice();
        let mut out = match ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(size, size, raw) {
            Some(_) if size == self.output_size => RgbImage::from_raw(size, size, raw.to_vec())
                .unwrap_or_else(|| RgbImage::new(size, size)),
            Some(small) => {
                imageops::resize(&small, self.output_size, self.output_size, FilterType::Triangle)
            }
            None => {
                log::warn!("Frame buffer does not match its declared {}px size", size);
                RgbImage::new(self.output_size, self.output_size)
            }
        };

        let scale = self.output_size as f32 / size.max(1) as f32;
        let radius = frame.pulse_radius * scale;
        match &self.logo {
            Some(logo) => blend_logo(&mut out, logo, radius),
            None => fill_disc(&mut out, radius, DISC_COLOR),
        }
        out
    }
}

fn blend_pixel(px: &mut Rgb<u8>, color: [u8; 3], a: f32) {
    let inv_a = 1.0 - a;
    for c in 0..3 {
        px[c] = (color[c] as f32 * a + px[c] as f32 * inv_a) as u8;
    }
}

/// Filled disc centered on the image with a one-pixel antialiased edge.
fn fill_disc(img: &mut RgbImage, radius: f32, color: [u8; 3]) {
    if radius <= 0.0 {
        return;
    }
    let center = img.width() as f32 / 2.0;
    let lo = (center - radius - 1.0).floor().max(0.0) as u32;
    let hi = ((center + radius + 1.0).ceil() as u32).min(img.width());
    for y in lo..hi.min(img.height()) {
        for x in lo..hi {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let a = (radius - dx.hypot(dy) + 0.5).clamp(0.0, 1.0);
            if a > 0.0 {
                blend_pixel(img.get_pixel_mut(x, y), color, a);
            }
        }
    }
}

fn blend_logo(img: &mut RgbImage, logo: &RgbaImage, radius: f32) {
    let diameter = (2.0 * radius) as u32;
    if diameter == 0 {
        return;
    }
    let scaled = imageops::resize(logo, diameter, diameter, FilterType::Lanczos3);
    let center = img.width() as i64 / 2;
    let origin = center - diameter as i64 / 2;
    for (lx, ly, px) in scaled.enumerate_pixels() {
        let x = origin + lx as i64;
        let y = origin + ly as i64;
        if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
            continue;
        }
        let a = px[3] as f32 / 255.0;
        if a > 0.0 {
            blend_pixel(img.get_pixel_mut(x as u32, y as u32), [px[0], px[1], px[2]], a);
        }
    }
}
