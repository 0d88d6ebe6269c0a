//! Probabilistic per-request trigger.

use rand::Rng;

use crate::GcConfig;

/// Decides whether this request should pay for a GC pass.
///
/// A pass runs with chance `probability / divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcTrigger {
    enabled: bool,
    probability: u32,
    divisor: u32,
}

impl GcTrigger {
    /// A trigger firing with `probability / divisor` odds, or never when
    /// disabled.
    pub fn new(config: &GcConfig) -> Self {
        let config = config.clone().validated();
        Self {
            enabled: config.enabled,
            probability: config.probability,
            divisor: config.divisor,
        }
    }

    /// Rolls the dice with the thread-local generator.
    pub fn should_run(&self) -> bool {
        self.should_run_with(&mut rand::rng())
    }

    /// Rolls the dice with `rng`.
    pub fn should_run_with<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        if !self.enabled || self.probability == 0 {
            return false;
        }
        rng.random_range(1..=self.divisor) <= self.probability
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn trigger(enabled: bool, probability: u32, divisor: u32) -> GcTrigger {
        GcTrigger::new(&GcConfig {
            enabled,
            probability,
            divisor,
            ..GcConfig::default()
        })
    }

    #[test]
    fn test_should_run_disabled_never_fires() {
        let t = trigger(false, 100, 100);
        assert!((0..100).all(|_| !t.should_run()));
    }

    #[test]
    fn test_should_run_zero_probability_never_fires() {
        let t = trigger(true, 0, 100);
        assert!((0..100).all(|_| !t.should_run()));
    }

    #[test]
    fn test_should_run_certain_always_fires() {
        let t = trigger(true, 7, 7);
        assert!((0..100).all(|_| t.should_run()));
    }

    #[test]
    fn test_should_run_with_seeded_rng_is_roughly_proportional() {
        let t = trigger(true, 1, 4);
        let mut rng = StdRng::seed_from_u64(7);

        let fired = (0..4_000).filter(|_| t.should_run_with(&mut rng)).count();

        assert!((800..1_200).contains(&fired), "fired {fired} times");
    }
}
