//! Seat targeting strategies for simulated requesters.

use rand::seq::SliceRandom;
use rand::Rng;
use seat_arbiter_core::SeatNumber;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A strategy whose parameters cannot be planned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    /// The popular-seat weight is not a probability.
    #[error("popular weight must be a number in [0, 1], got {0}")]
    InvalidWeight(f64),
}

/// Check that `weight` is a usable probability.
///
/// # Errors
///
/// Returns [`StrategyError::InvalidWeight`] for NaN, infinities and values
/// outside `[0, 1]`.
pub fn validate_weight(weight: f64) -> Result<f64, StrategyError> {
    if weight.is_finite() && (0.0..=1.0).contains(&weight) {
        Ok(weight)
    } else {
        Err(StrategyError::InvalidWeight(weight))
    }
}

/// How requesters of one run pick their seat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeatStrategy {
    /// Every requester targets the same seat: maximum contention.
    FixedTarget {
        /// The contested seat
        seat: SeatNumber,
    },
    /// Every requester takes any available seat with lock-skip: minimum contention.
    Random,
    /// Each requester targets one of a few popular seats with probability
    /// `popular_weight`, otherwise takes any available seat.
    Mixed {
        /// The popular subset
        popular: Vec<SeatNumber>,
        /// Chance in `[0, 1]` of going for a popular seat
        popular_weight: f64,
    },
    /// Read the available seats first, pick one uniformly, then target it
    /// fail-fast. The read happens outside the transaction, so the pick may be
    /// stale by the time it is locked.
    PreReadRandom,
}

/// Seat choice resolved for one requester before the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Lock this seat fail-fast
    Seat(SeatNumber),
    /// Let the store pick an available seat with lock-skip
    AnyAvailable,
    /// Pre-read the available seats and pick with this requester-private seed
    PreRead {
        /// Seed for this requester's picks across retries
        seed: u64,
    },
}

impl SeatStrategy {
    /// Mixed strategy with a checked weight.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::InvalidWeight`] if `popular_weight` is not in `[0, 1]`.
    pub fn mixed(popular: Vec<SeatNumber>, popular_weight: f64) -> Result<Self, StrategyError> {
        Ok(Self::Mixed {
            popular,
            popular_weight: validate_weight(popular_weight)?,
        })
    }

    /// Check the strategy's parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::InvalidWeight`] for a mixed strategy whose
    /// weight is not in `[0, 1]`.
    pub fn validate(&self) -> Result<(), StrategyError> {
        match self {
            Self::Mixed { popular_weight, .. } => validate_weight(*popular_weight).map(|_| ()),
            Self::FixedTarget { .. } | Self::Random | Self::PreReadRandom => Ok(()),
        }
    }

    /// Resolve one [`Target`] per requester.
    ///
    /// Resolution happens up front from a single RNG so that a seeded run
    /// targets the same seats every time.
    ///
    /// # Errors
    ///
    /// Returns a [`StrategyError`] if the strategy fails [`validate`](Self::validate).
    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R, population: u32) -> Result<Vec<Target>, StrategyError> {
        self.validate()?;
        Ok((0..population).map(|_| self.target_for(rng)).collect())
    }

    fn target_for<R: Rng + ?Sized>(&self, rng: &mut R) -> Target {
        match self {
            Self::FixedTarget { seat } => Target::Seat(*seat),
            Self::Random => Target::AnyAvailable,
            Self::Mixed {
                popular,
                popular_weight,
            } => {
                if rng.gen_bool(*popular_weight) {
                    popular
                        .choose(rng)
                        .map_or(Target::AnyAvailable, |seat| Target::Seat(*seat))
                } else {
                    Target::AnyAvailable
                }
            }
            Self::PreReadRandom => Target::PreRead { seed: rng.r#gen() },
        }
    }

    /// Short label for logs, reports and CSV rows.
    #[must_use]
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SeatStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedTarget { seat } => write!(f, "fixed:{}", seat.get()),
            Self::Random => f.write_str("random"),
            Self::Mixed {
                popular,
                popular_weight,
            } => {
                let seats: Vec<String> = popular.iter().map(|s| s.get().to_string()).collect();
                write!(f, "mixed:{}@{popular_weight}", seats.join("+"))
            }
            Self::PreReadRandom => f.write_str("pre-read"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fixed_target_plans_one_seat_for_everyone() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = SeatStrategy::FixedTarget {
            seat: SeatNumber::new(10),
        }
        .plan(&mut rng, 20)
        .unwrap();

        assert_eq!(plan.len(), 20);
        assert!(plan.iter().all(|t| *t == Target::Seat(SeatNumber::new(10))));
    }

    #[test]
    fn test_random_plans_any_available() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = SeatStrategy::Random.plan(&mut rng, 5).unwrap();
        assert!(plan.iter().all(|t| *t == Target::AnyAvailable));
    }

    #[test]
    fn test_mixed_extremes() {
        let popular = vec![SeatNumber::new(1), SeatNumber::new(2)];
        let mut rng = StdRng::seed_from_u64(1);

        let always = SeatStrategy::Mixed {
            popular: popular.clone(),
            popular_weight: 1.0,
        }
        .plan(&mut rng, 50)
        .unwrap();
        assert!(always.iter().all(|t| matches!(t, Target::Seat(s) if popular.contains(s))));

        let never = SeatStrategy::Mixed {
            popular,
            popular_weight: 0.0,
        }
        .plan(&mut rng, 50)
        .unwrap();
        assert!(never.iter().all(|t| *t == Target::AnyAvailable));
    }

    #[test]
    fn test_mixed_with_empty_popular_set_falls_back_to_random() {
        let mut rng = StdRng::seed_from_u64(3);
        let plan = SeatStrategy::Mixed {
            popular: Vec::new(),
            popular_weight: 1.0,
        }
        .plan(&mut rng, 10)
        .unwrap();
        assert!(plan.iter().all(|t| *t == Target::AnyAvailable));
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            SeatStrategy::FixedTarget {
                seat: SeatNumber::new(10)
            }
            .label(),
            "fixed:10"
        );
        assert_eq!(SeatStrategy::Random.label(), "random");
        assert_eq!(
            SeatStrategy::Mixed {
                popular: vec![SeatNumber::new(1), SeatNumber::new(2)],
                popular_weight: 0.8
            }
            .label(),
            "mixed:1+2@0.8"
        );
        assert_eq!(SeatStrategy::PreReadRandom.label(), "pre-read");
    }

    #[test]
    fn test_mixed_rejects_weights_that_are_not_probabilities() {
        let popular = vec![SeatNumber::new(1)];
        for weight in [f64::NAN, f64::INFINITY, -0.1, 1.5] {
            assert!(SeatStrategy::mixed(popular.clone(), weight).is_err());

            let unchecked = SeatStrategy::Mixed {
                popular: popular.clone(),
                popular_weight: weight,
            };
            let mut rng = StdRng::seed_from_u64(5);
            assert!(matches!(
                unchecked.plan(&mut rng, 3),
                Err(StrategyError::InvalidWeight(_))
            ));
        }
        assert!(SeatStrategy::mixed(popular, 0.25).is_ok());
    }

    proptest! {
        #[test]
        fn same_seed_same_plan(seed in any::<u64>(), population in 0u32..200, weight in 0.0f64..=1.0) {
            let strategy = SeatStrategy::Mixed {
                popular: vec![SeatNumber::new(1), SeatNumber::new(5), SeatNumber::new(9)],
                popular_weight: weight,
            };
            let a = strategy.plan(&mut StdRng::seed_from_u64(seed), population).unwrap();
            let b = strategy.plan(&mut StdRng::seed_from_u64(seed), population).unwrap();
            prop_assert_eq!(a.len(), population as usize);
            prop_assert_eq!(a, b);
        }
    }
}
