//! Plasticity: how aggressively a connection currently adapts.
//!
//! A bounded Q10 scalar. It drifts down toward its floor on every ack cycle,
//! jumps up on loss and recovery events, and returns to its base value after
//! an idle restart. Every operation keeps it within `[floor, ceiling]`.

use serde::Serialize;

use crate::config::{Decay, PlasticityConfig, SCALE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Plasticity(u16);

impl Plasticity {
    pub fn new(config: &PlasticityConfig) -> Self {
        Self(config.base)
    }

    /// Raw Q10 value.
    pub fn get(self) -> u16 {
        self.0
    }

    /// One cycle of decay toward the floor.
    pub fn decay(&mut self, config: &PlasticityConfig) {
        let decayed = match config.decay {
            Decay::Multiplicative { factor } => {
                ((u32::from(self.0) * u32::from(factor)) / u32::from(SCALE)) as u16
            }
            Decay::Linear { step } => self.0.saturating_sub(step),
        };
        self.0 = decayed.clamp(config.floor, config.ceiling);
    }

    /// Raise by `amount`, stopping at the ceiling.
    pub fn boost(&mut self, amount: u16, config: &PlasticityConfig) {
        self.0 = self
            .0
            .saturating_add(amount)
            .clamp(config.floor, config.ceiling);
    }

    pub fn reset_to_base(&mut self, config: &PlasticityConfig) {
        self.0 = config.base;
    }

    pub(crate) fn is_within(self, config: &PlasticityConfig) -> bool {
        (config.floor..=config.ceiling).contains(&self.0)
    }

    pub(crate) fn clamp_to(&mut self, config: &PlasticityConfig) {
        self.0 = self.0.clamp(config.floor, config.ceiling);
    }

    #[cfg(test)]
    pub(crate) fn from_raw(value: u16) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::config::Tier;

    #[test]
    fn decay_is_monotonic_and_floored() {
        for tier in Tier::ALL {
            let config = tier.config().plasticity;
            let mut p = Plasticity::new(&config);
            p.boost(SCALE, &config);
            let mut previous = p.get();
            for _ in 0..5_000 {
                p.decay(&config);
                assert!(p.get() <= previous);
                assert!(p.get() >= config.floor);
                previous = p.get();
            }
            assert_eq!(p.get(), config.floor, "{tier}");
        }
    }

    #[test]
    fn multiplicative_decay_matches_factor() {
        let config = PlasticityConfig::default();
        let mut p = Plasticity::from_raw(1024);
        p.decay(&config);
        assert_eq!(p.get(), 1019);
    }

    #[test]
    fn boosts_never_exceed_ceiling() {
        let config = PlasticityConfig::default();
        let mut p = Plasticity::new(&config);
        for _ in 0..100 {
            p.boost(config.recovery_boost, &config);
            assert!(p.get() <= config.ceiling);
        }
        assert_eq!(p.get(), config.ceiling);
    }

    #[test]
    fn reset_restores_base() {
        let config = PlasticityConfig::default();
        let mut p = Plasticity::new(&config);
        p.boost(400, &config);
        p.reset_to_base(&config);
        assert_eq!(p.get(), config.base);
    }

    #[test]
    fn random_sequences_stay_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for tier in Tier::ALL {
            let config = tier.config().plasticity;
            let mut p = Plasticity::new(&config);
            for _ in 0..10_000 {
                match rng.gen_range(0..4) {
                    0 => p.boost(config.loss_boost, &config),
                    1 => p.boost(config.recovery_boost, &config),
                    2 => p.reset_to_base(&config),
                    _ => p.decay(&config),
                }
                assert!(p.is_within(&config), "{tier}: {p:?}");
            }
        }
    }
}
