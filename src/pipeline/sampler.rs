//! Progressive sample counting and the running-mean blend weight.
//!
//! The accumulated image always holds the mean of every sample taken since the
//! last reset. Folding sample `n` (0-based) uses
//!
//! ```text
//! acc' = acc * (1 - w) + sample * w,   w = 1 / (n + 1)
//! ```
//!
//! which is the closed-form incremental mean, so no separate sum is stored and
//! the blend maps directly onto a constant-factor hardware blend.

/// Running mean of a scalar for weight `w`.
#[inline]
pub fn running_mean(accumulated: f32, sample: f32, weight: f32) -> f32 {
    accumulated * (1.0 - weight) + sample * weight
}

/// Tracks how many samples have been folded into the accumulated image.
#[derive(Debug, Clone)]
pub struct ProgressiveSampler {
    sample_count: u32,
    target: u32,
    observed_generation: u64,
}

impl ProgressiveSampler {
    pub fn new(target: u32) -> Self {
        Self {
            sample_count: 0,
            target,
            observed_generation: 0,
        }
    }

    /// Number of samples in the accumulated image.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// True while the image has fewer samples than the target.
    pub fn should_advance(&self) -> bool {
        self.sample_count < self.target
    }

    pub fn is_converged(&self) -> bool {
        !self.should_advance()
    }

    /// Blend weight for the next sample.
    pub fn weight(&self) -> f32 {
        1.0 / (self.sample_count as f32 + 1.0)
    }

    /// Fraction of the target reached, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.target == 0 {
            1.0
        } else {
            self.sample_count as f32 / self.target as f32
        }
    }

    /// Fold one sample: `fold` receives the weight and performs the blend,
    /// then the counter advances.
    pub fn blend_with<R>(&mut self, fold: impl FnOnce(f32) -> R) -> R {
        debug_assert!(self.should_advance(), "blend past target sample count");
        let result = fold(self.weight());
        self.sample_count += 1;
        result
    }

    /// Fallible variant of [`blend_with`](Self::blend_with); the counter only
    /// advances when the blend succeeded.
    pub fn try_blend_with<T, E>(
        &mut self,
        fold: impl FnOnce(f32) -> Result<T, E>,
    ) -> Result<T, E> {
        let result = fold(self.weight())?;
        self.sample_count += 1;
        Ok(result)
    }

    /// Accumulated history became meaningless (resolution change).
    pub fn on_resize(&mut self) {
        self.reset();
    }

    /// Restart accumulation from the next sample.
    pub fn reset(&mut self) {
        if self.sample_count > 0 {
            log::debug!("accumulation reset after {} samples", self.sample_count);
        }
        self.sample_count = 0;
    }

    /// Compare against the resource generation and reset if it moved.
    ///
    /// Returns true when a reset happened.
    pub fn sync_generation(&mut self, generation: u64) -> bool {
        if generation == self.observed_generation {
            return false;
        }
        self.observed_generation = generation;
        self.on_resize();
        true
    }

    /// Change the target. Lowering it below the current count restarts
    /// accumulation so the count never exceeds the target.
    pub fn set_target(&mut self, target: u32) {
        self.target = target;
        if self.sample_count > target {
            self.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold_all(sampler: &mut ProgressiveSampler, acc: &mut f32, samples: &[f32]) -> Vec<f32> {
        samples
            .iter()
            .map(|&s| {
                sampler.blend_with(|w| *acc = running_mean(*acc, s, w));
                *acc
            })
            .collect()
    }

    #[test]
    fn test_incremental_mean_example() {
        let mut sampler = ProgressiveSampler::new(16);
        let mut acc = 0.0;
        let steps = fold_all(&mut sampler, &mut acc, &[1.0, 0.0, 0.5]);
        for (got, want) in steps.iter().zip([1.0, 0.5, 0.5]) {
            assert!((got - want).abs() < 1e-6, "{steps:?}");
        }
        assert_eq!(sampler.sample_count(), 3);
    }

    #[test]
    fn test_incremental_mean_matches_arithmetic_mean() {
        let samples: Vec<f32> = (0..500).map(|i| ((i * 37) % 101) as f32 / 7.0).collect();
        let mut sampler = ProgressiveSampler::new(1000);
        let mut acc = 123.0; // stale value, replaced by the first sample
        fold_all(&mut sampler, &mut acc, &samples);
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!((acc - mean).abs() < 1e-3 * mean.abs().max(1.0), "{acc} vs {mean}");
    }

    #[test]
    fn test_resize_resets_convergence() {
        let mut sampler = ProgressiveSampler::new(100);
        let mut acc = 0.0;
        fold_all(&mut sampler, &mut acc, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(sampler.sample_count(), 5);

        // 800x600 -> 640x480 bumps the generation
        assert!(sampler.sync_generation(1));
        assert_eq!(sampler.sample_count(), 0);
        assert_eq!(sampler.weight(), 1.0);

        sampler.blend_with(|w| acc = running_mean(acc, 42.0, w));
        assert_eq!(acc, 42.0);

        // same generation again: no reset
        assert!(!sampler.sync_generation(1));
        assert_eq!(sampler.sample_count(), 1);
    }

    #[test]
    fn test_should_advance_until_target() {
        let mut sampler = ProgressiveSampler::new(2);
        assert!(sampler.should_advance());
        sampler.blend_with(|_| ());
        sampler.blend_with(|_| ());
        assert!(!sampler.should_advance());
        assert!(sampler.is_converged());
        assert_eq!(sampler.progress(), 1.0);
    }

    #[test]
    fn test_try_blend_keeps_count_on_failure() {
        let mut sampler = ProgressiveSampler::new(4);
        let r: Result<(), &str> = sampler.try_blend_with(|_| Err("device lost"));
        assert!(r.is_err());
        assert_eq!(sampler.sample_count(), 0);
    }

    #[test]
    fn test_set_target() {
        let mut sampler = ProgressiveSampler::new(4);
        for _ in 0..4 {
            sampler.blend_with(|_| ());
        }
        sampler.set_target(8);
        assert_eq!(sampler.sample_count(), 4);
        assert!(sampler.should_advance());

        sampler.set_target(2);
        assert_eq!(sampler.sample_count(), 0);
    }
}
