use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::ConfigError;
use crate::params::AudioParams;

/// Logarithmic band layout over the FFT bins of one analysis block.
/// Built once per configuration and read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct BandTable {
    sample_rate: u32,
    block_len: usize,
    /// Geometric band edges in Hz, `bands + 1` entries.
    edges: Vec<f32>,
    centers: Vec<f32>,
    /// Band of each bin in `0..=block_len/2`, `None` when outside the range.
    bin_band: Vec<Option<usize>>,
    /// Assigned bins per band, clamped to at least 1.
    counts: Vec<f32>,
    window: Vec<f32>,
}

impl BandTable {
    pub fn new(params: &AudioParams) -> Result<Self, ConfigError> {
        if params.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if params.block_len < 2 {
            return Err(ConfigError::BlockTooShort(params.block_len));
        }
        if params.bands == 0 {
            return Err(ConfigError::NoBands);
        }
        let (min_hz, max_hz, nyquist) = (params.min_hz, params.max_hz(), params.nyquist());
        if !(min_hz > 0.0 && min_hz < max_hz && max_hz <= nyquist) {
            return Err(ConfigError::BandRange { min_hz, max_hz, nyquist });
        }

        let bands = params.bands;
        let ratio = max_hz as f64 / min_hz as f64;
        let mut edges: Vec<f32> = (0..=bands)
            .map(|i| (min_hz as f64 * ratio.powf(i as f64 / bands as f64)) as f32)
            .collect();
        edges[0] = min_hz;
        edges[bands] = max_hz;

        let centers = edges.windows(2).map(|w| (w[0] * w[1]).sqrt()).collect();

        let bin_hz = params.sample_rate as f32 / params.block_len as f32;
        let bin_band: Vec<Option<usize>> = (0..=params.block_len / 2)
            .map(|bin| band_for_frequency(&edges, bin as f32 * bin_hz))
            .collect();

        let mut counts = vec![0.0f32; bands];
        for band in bin_band.iter().flatten() {
            counts[*band] += 1.0;
        }
        for count in counts.iter_mut() {
            if *count == 0.0 {
                *count = 1.0;
            }
        }

        Ok(Self {
            sample_rate: params.sample_rate,
            block_len: params.block_len,
            edges,
            centers,
            bin_band,
            counts,
            window: hann_window(params.block_len),
        })
    }

    pub fn bands(&self) -> usize {
        self.centers.len()
    }

    pub fn bins(&self) -> usize {
        self.bin_band.len()
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    #[allow(dead_code)]
    pub fn edges(&self) -> &[f32] {
        &self.edges
    }

    pub fn centers(&self) -> &[f32] {
        &self.centers
    }

    pub fn counts(&self) -> &[f32] {
        &self.counts
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn band_of(&self, bin: usize) -> Option<usize> {
        self.bin_band.get(bin).copied().flatten()
    }

    #[allow(dead_code)]
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.block_len as f32
    }
}

fn band_for_frequency(edges: &[f32], freq: f32) -> Option<usize> {
    let last = *edges.last()?;
    if freq < edges[0] || freq >= last {
        return None;
    }
    // Number of edges <= freq, minus one, is the band whose lower edge we passed.
    Some(edges.partition_point(|&e| e <= freq) - 1)
}

/// Symmetric raised-cosine analysis window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Turns one mono block into a mean magnitude per band.
pub struct SpectralMapper {
    table: BandTable,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralMapper {
    pub fn new(table: BandTable) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(table.block_len());
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            buffer: vec![Complex::new(0.0, 0.0); table.block_len()],
            table,
            fft,
            scratch,
        }
    }

    #[allow(dead_code)]
    pub fn table(&self) -> &BandTable {
        &self.table
    }

    /// Short blocks are zero-padded, long ones truncated to the block length.
    pub fn band_magnitudes(&mut self, mono: &[f32]) -> Vec<f32> {
        let window = self.table.window();
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = mono.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let mut sums = vec![0.0f32; self.table.bands()];
        for (bin, value) in self.buffer[..self.table.bins()].iter().enumerate() {
            if let Some(band) = self.table.band_of(bin) {
                sums[band] += value.norm();
            }
        }
        sums.iter()
            .zip(self.table.counts())
            .map(|(sum, count)| sum / count)
            .collect()
    }
}
