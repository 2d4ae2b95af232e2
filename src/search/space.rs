//! Search space over trial configurations

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::network::{NetworkConfig, NormKind};

const HIDDEN_SIZES: [usize; 3] = [128, 256, 512];
const DROPOUTS: [f32; 4] = [0.1, 0.2, 0.25, 0.5];
const LR_LOW: f64 = 1e-4;
const LR_HIGH: f64 = 1e-1;

/// Samples trial configurations: uniform categorical choices for width,
/// dropout, and normalization; log-uniform for the learning rate.
#[derive(Debug)]
pub struct SearchSpace {
    rng: Xoshiro256PlusPlus,
}

impl SearchSpace {
    /// Create a seeded sampler over the fixed space
    pub fn new(seed: u64) -> Self {
        Self { rng: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }

    /// Sample one configuration
    pub fn sample(&mut self) -> NetworkConfig {
        let hidden_size = HIDDEN_SIZES[self.rng.gen_range(0..HIDDEN_SIZES.len())];
        let dropout = DROPOUTS[self.rng.gen_range(0..DROPOUTS.len())];
        let learning_rate = {
            let (lo, hi) = (LR_LOW.ln(), LR_HIGH.ln());
            (self.rng.gen::<f64>() * (hi - lo) + lo).exp()
        };
        let use_norm = self.rng.gen::<bool>();
        let norm_kind = if self.rng.gen::<bool>() { NormKind::Instance } else { NormKind::Batch };

        NetworkConfig { hidden_size, dropout, learning_rate, use_norm, norm_kind }
    }

    /// Sample a batch of configurations
    pub fn sample_many(&mut self, n: usize) -> Vec<NetworkConfig> {
        (0..n).map(|_| self.sample()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_in_domain() {
        let mut space = SearchSpace::new(42);
        for config in space.sample_many(200) {
            assert!(HIDDEN_SIZES.contains(&config.hidden_size));
            assert!(DROPOUTS.contains(&config.dropout));
            assert!(config.learning_rate >= LR_LOW && config.learning_rate <= LR_HIGH);
        }
    }

    #[test]
    fn test_sampling_is_seeded() {
        let a = SearchSpace::new(7).sample_many(10);
        let b = SearchSpace::new(7).sample_many(10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_log_uniform_covers_decades() {
        let mut space = SearchSpace::new(3);
        let configs = space.sample_many(500);
        let below_1e3 = configs.iter().filter(|c| c.learning_rate < 1e-3).count();
        let above_1e2 = configs.iter().filter(|c| c.learning_rate > 1e-2).count();
        // A log-uniform draw puts roughly a third of the mass in each decade.
        assert!(below_1e3 > 100, "low decade undersampled: {below_1e3}");
        assert!(above_1e2 > 100, "high decade undersampled: {above_1e2}");
    }
}
