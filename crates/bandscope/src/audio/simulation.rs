//! Synthetic spectrum generator
//!
//! Produces a plausible, bass-heavy bar pattern from elapsed time when the
//! real transform path has no data but playback is active.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::simulation::{BASE_LEVEL, BASS_WEIGHT, JITTER, WAVES};

/// Time-driven fallback spectrum
pub struct SimulationGenerator {
    bin_count: usize,
    rng: StdRng,
}

impl SimulationGenerator {
    /// Generator with an entropy-seeded jitter source
    pub fn new(bin_count: usize) -> Self {
        Self {
            bin_count,
            rng: StdRng::from_entropy(),
        }
    }

    /// Generator with a fixed jitter seed (reproducible output)
    pub fn with_seed(bin_count: usize, seed: u64) -> Self {
        Self {
            bin_count,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Linear bass emphasis: 1.0 at bin 0 down to 0.0 at the last bin
    pub fn bass_factor(&self, index: usize) -> f32 {
        if self.bin_count <= 1 {
            return 1.0;
        }
        1.0 - index as f32 / (self.bin_count - 1) as f32
    }

    /// Fill `out` (resized to `bin_count`) with the pattern at `elapsed_secs`.
    pub fn generate(&mut self, elapsed_secs: f32, out: &mut Vec<f32>) {
        out.clear();
        for i in 0..self.bin_count {
            let phase = i as f32;
            let waves: f32 = WAVES
                .iter()
                .map(|&(amp, rate, step)| amp * (elapsed_secs * rate + phase * step).sin())
                .sum();
            let jitter = self.rng.gen_range(-JITTER..=JITTER);
            let value = BASE_LEVEL + BASS_WEIGHT * self.bass_factor(i) + waves + jitter;
            out.push(value.clamp(0.0, 1.0));
        }
    }
}
