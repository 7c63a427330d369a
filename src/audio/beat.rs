use std::time::Duration;

use super::bands::BandTable;
use super::stats::{median, median_abs_deviation};
use crate::params::{defaults, BeatParams};

/// Scales a MAD to a standard-deviation estimate under normality.
const MAD_TO_SIGMA: f32 = 1.4826;
const MAD_EPSILON: f32 = 1e-9;
const WEIGHT_EPSILON: f32 = 1e-9;

/// Fixed-capacity ring buffer of past flux values.
#[derive(Clone, Debug)]
pub struct FluxHistory {
    values: Vec<f32>,
    cursor: usize,
    filled: usize,
}

impl FluxHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0.0; capacity.max(1)],
            cursor: 0,
            filled: 0,
        }
    }

    pub fn push(&mut self, value: f32) {
        self.values[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.values.len();
        self.filled = (self.filled + 1).min(self.values.len());
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[allow(dead_code)]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Stored samples in storage order; order is irrelevant to the statistics.
    pub fn samples(&self) -> &[f32] {
        &self.values[..self.filled]
    }

    /// `median + k * 1.4826 * MAD`, or `fallback` while fewer than
    /// `min_samples` values are stored.
    pub fn threshold(&self, k: f32, fallback: f32, min_samples: usize) -> f32 {
        if self.filled < min_samples {
            return fallback;
        }
        let samples = self.samples();
        let center = median(samples);
        let mad = median_abs_deviation(samples, center) + MAD_EPSILON;
        center + k * MAD_TO_SIGMA * mad
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BeatOutcome {
    pub triggered: bool,
    /// Pulse intensity after this tick's decay and any increment.
    pub pulse: f32,
    /// Bass flux measured this tick.
    pub flux: f32,
    pub threshold: f32,
}

/// Bass-only onset detection with an adaptive, outlier-resistant threshold.
pub struct BassBeatDetector {
    params: BeatParams,
    bass_bands: Vec<usize>,
    weights: Vec<f32>,
    history: FluxHistory,
    prev_bass: Option<Vec<f32>>,
    flux_prev1: f32,
    flux_prev2: f32,
    last_trigger: Duration,
    pulse: f32,
}

impl BassBeatDetector {
    /// Bands whose center sits at or below `cutoff_hz` count as bass; band 0
    /// always does when none qualifies.
    pub fn new(table: &BandTable, cutoff_hz: f32, params: BeatParams) -> Self {
        let mut bass_bands: Vec<usize> = table
            .centers()
            .iter()
            .enumerate()
            .filter(|&(_, &center)| center <= cutoff_hz)
            .map(|(i, _)| i)
            .collect();
        if bass_bands.is_empty() {
            bass_bands.push(0);
        }

        let cutoff = cutoff_hz.max(1e-6);
        let mut weights: Vec<f32> = bass_bands
            .iter()
            .map(|&band| {
                (table.centers()[band] / cutoff)
                    .clamp(0.0, 1.0)
                    .powf(params.bass_weight_exp)
            })
            .collect();
        let total = weights.iter().sum::<f32>() + WEIGHT_EPSILON;
        for w in weights.iter_mut() {
            *w /= total;
        }

        log::debug!("Bass bands {:?}, weights {:?}", bass_bands, weights);

        Self {
            history: FluxHistory::new(params.history_len),
            params,
            bass_bands,
            weights,
            prev_bass: None,
            flux_prev1: 0.0,
            flux_prev2: 0.0,
            last_trigger: Duration::ZERO,
            pulse: 0.0,
        }
    }

    #[allow(dead_code)]
    pub fn bass_bands(&self) -> &[usize] {
        &self.bass_bands
    }

    #[allow(dead_code)]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[allow(dead_code)]
    pub fn pulse(&self) -> f32 {
        self.pulse
    }

    #[allow(dead_code)]
    pub fn history(&self) -> &FluxHistory {
        &self.history
    }

    /// Weighted positive change of the bass bands since the previous tick.
    fn bass_flux(&mut self, normalized: &[f32]) -> f32 {
        let bass: Vec<f32> = self
            .bass_bands
            .iter()
            .map(|&band| normalized.get(band).copied().unwrap_or(0.0))
            .collect();

        let flux = match &self.prev_bass {
            None => 0.0,
            Some(prev) => bass
                .iter()
                .zip(prev)
                .zip(&self.weights)
                .map(|((cur, prev), w)| (cur - prev).clamp(0.0, 1.0) * w)
                .sum(),
        };
        self.prev_bass = Some(bass);
        flux
    }

    /// One tick. `normalized` are the pre-smoothing band values and
    /// `activity` the envelope's activity for the same tick.
    ///
    /// The peak test runs on the previous tick's flux, which is pushed to the
    /// history before the threshold is computed, so a beat is reported one
    /// tick after the energy jump.
    pub fn process(&mut self, normalized: &[f32], activity: f32, now: Duration) -> BeatOutcome {
        let flux = self.bass_flux(normalized);

        self.history.push(self.flux_prev1);
        let threshold = self.history.threshold(
            self.params.k_mad,
            self.params.warmup_threshold,
            defaults::FLUX_MIN_HISTORY,
        );

        let candidate = self.flux_prev1;
        let is_peak = candidate > self.flux_prev2 && candidate > flux;
        let strong_enough = candidate > threshold;
        let refractory_ok = now.saturating_sub(self.last_trigger) >= self.params.refractory();
        let active_enough = activity >= self.params.min_activity;

        self.pulse *= self.params.pulse_decay;
        let triggered = is_peak && strong_enough && refractory_ok && active_enough;
        if triggered {
            self.pulse += self.params.pulse_gain;
            self.last_trigger = now;
            log::debug!(
                "Bass beat at {:.3}s: flux={:.4} threshold={:.4} pulse={:.3}",
                now.as_secs_f32(),
                candidate,
                threshold,
                self.pulse
            );
        }

        self.flux_prev2 = self.flux_prev1;
        self.flux_prev1 = flux;

        BeatOutcome {
            triggered,
            pulse: self.pulse,
            flux,
            threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::AudioParams;

    const TICK: Duration = Duration::from_millis(25);

    fn detector() -> BassBeatDetector {
        let table = BandTable::new(&AudioParams::default()).unwrap();
        BassBeatDetector::new(&table, 160.0, BeatParams::default())
    }

    fn bass_vector(value: f32) -> Vec<f32> {
        let mut norm = vec![0.0; 16];
        norm[..3].iter_mut().for_each(|v| *v = value);
        norm
    }

    /// Feeds `patterns` one tick apart starting at `start`, returns trigger ticks.
    fn run(det: &mut BassBeatDetector, patterns: &[f32], start: usize) -> Vec<usize> {
        patterns
            .iter()
            .enumerate()
            .filter_map(|(i, &value)| {
                let tick = start + i;
                let outcome = det.process(&bass_vector(value), 1.0, TICK * tick as u32);
                outcome.triggered.then_some(tick)
            })
            .collect()
    }

    #[test]
    fn history_wraps_at_capacity() {
        let mut history = FluxHistory::new(4);
        for v in 0..6 {
            history.push(v as f32);
        }
        assert_eq!(history.len(), 4);
        assert_eq!(history.capacity(), 4);
        let mut samples = history.samples().to_vec();
        samples.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(samples, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn threshold_falls_back_during_warmup() {
        let mut history = FluxHistory::new(90);
        for _ in 0..9 {
            history.push(0.0);
        }
        assert_eq!(history.threshold(4.0, 1.0, 10), 1.0);
        history.push(0.0);
        assert!(history.threshold(4.0, 1.0, 10) < 1e-6);
    }

    #[test]
    fn bass_weights_cover_low_bands_and_sum_to_one() {
        let det = detector();
        assert_eq!(det.bass_bands(), &[0, 1, 2]);
        let total: f32 = det.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(det.weights().iter().all(|&w| w > 0.0 && w < 1.0));
        // Higher bass bands weigh more.
        assert!(det.weights().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_flux_never_triggers() {
        // With an all-zero history the MAD is zero and the threshold collapses
        // to ~1e-8, but a flat signal has no strict local peak to exceed it.
        let mut det = detector();
        let flat = vec![0.3; 200];
        assert!(run(&mut det, &flat, 0).is_empty());
        assert!(det.history().len() == det.history().capacity());
        assert_eq!(det.pulse(), 0.0);
    }

    #[test]
    fn warmup_suppresses_early_peaks() {
        let mut det = detector();
        // Strong peaks before ten history samples exist stay below the fallback.
        let early = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        assert!(run(&mut det, &early, 0).is_empty());
    }

    #[test]
    fn onset_fires_one_tick_late() {
        let mut det = detector();
        let warmup = vec![0.0; 12];
        assert!(run(&mut det, &warmup, 0).is_empty());

        let triggers = run(&mut det, &[1.0, 1.0, 1.0], 12);
        assert_eq!(triggers, vec![13]);
        assert!((det.pulse() - 0.6 * 0.5).abs() < 1e-6);
    }

    #[test]
    fn refractory_suppresses_second_peak() {
        let mut det = detector();
        run(&mut det, &vec![0.0; 12], 0);

        // Peaks detected at ticks 13 and 15: 50 ms apart at 25 ms per tick.
        let triggers = run(&mut det, &[1.0, 0.0, 1.0, 0.0, 0.0], 12);
        assert_eq!(triggers, vec![13]);
    }

    #[test]
    fn peaks_outside_refractory_both_trigger() {
        let mut det = detector();
        run(&mut det, &vec![0.0; 12], 0);

        // Detections at ticks 13 and 19: 150 ms apart.
        let pattern = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let triggers = run(&mut det, &pattern, 12);
        assert_eq!(triggers, vec![13, 19]);
    }

    #[test]
    fn silence_gate_blocks_quiet_peaks() {
        let mut det = detector();
        for tick in 0..12u32 {
            det.process(&bass_vector(0.0), 0.0, TICK * tick);
        }
        let outcome_a = det.process(&bass_vector(1.0), 0.05, TICK * 12);
        let outcome_b = det.process(&bass_vector(0.0), 0.05, TICK * 13);
        assert!(!outcome_a.triggered && !outcome_b.triggered);
    }

    #[test]
    fn pulse_decays_geometrically() {
        let mut det = detector();
        run(&mut det, &vec![0.0; 12], 0);
        run(&mut det, &[1.0, 1.0], 12);
        let start = det.pulse();
        run(&mut det, &[1.0, 1.0], 14);
        assert!((det.pulse() - start * 0.25).abs() < 1e-6);
    }
}
