//! FSRS-5 memory model: pure functions over stability/difficulty/retrievability.
//!
//! All functions here are deterministic; `fuzz_interval` is the sole exception
//! and takes an explicit `Rng` rather than reaching for a global one.

use serde::{Deserialize, Serialize};

use crate::domain::Rating;
use crate::error::{CoreError, CoreResult};
use crate::rng::Rng;

pub const NUM_WEIGHTS: usize = 19;
pub type Weights = [f64; NUM_WEIGHTS];

/// FSRS-5 default weights (the same values Anki ships as its stock parameters).
pub const DEFAULT_WEIGHTS: Weights = [
    0.4072, 1.1829, 3.1262, 15.4722, 7.2102, 0.5316, 1.0651, 0.0234, 1.616, 0.1544, 1.0824,
    1.9813, 0.0953, 0.2975, 2.2042, 0.2407, 2.9466, 0.5034, 0.6567,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsParameters {
    pub weights: Weights,
    pub request_retention: f64,
    pub maximum_interval: i64,
}

impl Default for FsrsParameters {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            request_retention: 0.9,
            maximum_interval: 36_500,
        }
    }
}

impl FsrsParameters {
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.request_retention > 0.0 && self.request_retention < 1.0) {
            return Err(CoreError::InvalidParameter(
                "requestRetention must be in (0, 1)".into(),
            ));
        }
        if !(1..=36_500).contains(&self.maximum_interval) {
            return Err(CoreError::InvalidParameter(
                "maximumInterval must be in [1, 36500]".into(),
            ));
        }
        Ok(())
    }
}

fn clamp_difficulty(d: f64) -> f64 {
    d.clamp(1.0, 10.0)
}

/// `R(t, S) = (1 + t / (9S))^-1`, with `R(0, _) = 1` and `R(_, S <= 0) = 0`.
pub fn retrievability(elapsed_days: f64, stability: f64) -> f64 {
    if elapsed_days <= 0.0 {
        return 1.0;
    }
    if stability <= 0.0 {
        return 0.0;
    }
    (1.0 + elapsed_days / (9.0 * stability)).powf(-1.0)
}

pub fn init_stability(w: &Weights, rating: Rating) -> f64 {
    w[rating.as_i64() as usize - 1].max(0.01)
}

pub fn init_difficulty(w: &Weights, rating: Rating) -> f64 {
    let g = rating.as_i64() as f64;
    clamp_difficulty(w[4] - (w[5] * (g - 1.0)).exp() + 1.0)
}

pub fn next_difficulty(w: &Weights, difficulty: f64, rating: Rating) -> f64 {
    let g = rating.as_i64() as f64;
    let d0_3 = w[4] - (w[5] * 2.0).exp() + 1.0;
    clamp_difficulty(w[7] * d0_3 + (1.0 - w[7]) * (difficulty - w[6] * (g - 3.0)))
}

/// Next stability for `rating ∈ {Hard, Good, Easy}` while already in Review state.
pub fn success_stability(w: &Weights, stability: f64, difficulty: f64, r: f64, rating: Rating) -> f64 {
    let hard_penalty = if rating == Rating::Hard { w[16] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[17] } else { 1.0 };
    let factor = w[8].exp()
        * (11.0 - difficulty)
        * stability.powf(-w[10])
        * ((w[11] * (1.0 - r)).exp() - 1.0)
        * hard_penalty
        * easy_bonus;
    (stability * (factor + 1.0)).max(0.01)
}

/// Next stability for `rating = Again` while already in Review state.
pub fn failure_stability(w: &Weights, stability: f64, difficulty: f64, r: f64) -> f64 {
    let s = w[12] * difficulty.powf(-w[13]) * ((stability + 1.0).powf(w[14]) - 1.0) * (w[15] * (1.0 - r)).exp();
    s.min(stability).max(0.01)
}

/// Short-term (intra-step) stability update used while a card remains in a step ladder.
pub fn short_term_stability(w: &Weights, stability: f64, rating: Rating) -> f64 {
    let g = rating.as_i64() as f64;
    (stability * (w[18] * (g - 3.0 + w[17])).exp()).max(0.01)
}

/// `I = round(9S(1/R_req - 1))`, clamped to `[1, maximumInterval]`.
pub fn next_interval(stability: f64, request_retention: f64, maximum_interval: i64) -> CoreResult<i64> {
    if !(request_retention > 0.0 && request_retention < 1.0) {
        return Err(CoreError::InvalidParameter(
            "requestRetention must be in (0, 1)".into(),
        ));
    }
    let interval = (9.0 * stability * (1.0 / request_retention - 1.0)).round() as i64;
    Ok(interval.clamp(1, maximum_interval))
}

/// Fuzz half-width `f(I)` per §4.1 (caller is responsible for the `I > 2` gate).
pub fn fuzz_bounds(interval: i64) -> i64 {
    let i = interval as f64;
    let f = if interval <= 6 {
        1.0
    } else if interval <= 13 {
        (0.15 * i).round()
    } else {
        (0.20 * i).round().min(30.0)
    };
    f.max(1.0) as i64
}

/// Sample a fuzzed interval uniformly from `[I - f, I + f]`; no-op for `I <= 2`.
pub fn fuzz_interval(interval: i64, rng: &mut dyn Rng) -> i64 {
    if interval <= 2 {
        return interval;
    }
    let f = fuzz_bounds(interval);
    let low = (interval - f).max(1);
    let high = interval + f;
    low + rng.gen_range(0, high - low + 1)
}

/// The four per-rating outcomes of reviewing a card already in Review state.
#[derive(Debug, Clone, Copy)]
pub struct ReviewOutcome {
    pub stability: f64,
    pub difficulty: f64,
    pub interval_days: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduledOutcomes {
    pub again: ReviewOutcome,
    pub hard: ReviewOutcome,
    pub good: ReviewOutcome,
    pub easy: ReviewOutcome,
}

/// Computes all four rating outcomes for a card currently in Review state,
/// enforcing the monotonicity constraints across buttons from §4.1.
pub fn schedule(
    stability: f64,
    difficulty: f64,
    elapsed_days: i64,
    scheduled_days: i64,
    params: &FsrsParameters,
) -> CoreResult<ScheduledOutcomes> {
    params.validate()?;
    let r = retrievability(elapsed_days as f64, stability);
    let w = &params.weights;

    let mut outcome_for = |rating: Rating| -> CoreResult<ReviewOutcome> {
        let (s, d) = if rating == Rating::Again {
            (failure_stability(w, stability, difficulty, r), next_difficulty(w, difficulty, rating))
        } else {
            (
                success_stability(w, stability, difficulty, r, rating),
                next_difficulty(w, difficulty, rating),
            )
        };
        let interval = next_interval(s, params.request_retention, params.maximum_interval)?;
        Ok(ReviewOutcome { stability: s, difficulty: d, interval_days: interval })
    };

    let again = outcome_for(Rating::Again)?;
    let mut hard = outcome_for(Rating::Hard)?;
    let mut good = outcome_for(Rating::Good)?;
    let mut easy = outcome_for(Rating::Easy)?;

    hard.interval_days = hard.interval_days.max(scheduled_days);
    good.interval_days = good.interval_days.max(hard.interval_days + 1);
    easy.interval_days = easy.interval_days.max(good.interval_days + 1);

    hard.interval_days = hard.interval_days.min(params.maximum_interval);
    good.interval_days = good.interval_days.min(params.maximum_interval);
    easy.interval_days = easy.interval_days.min(params.maximum_interval);

    Ok(ScheduledOutcomes { again, hard, good, easy })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrievability_bounds_and_monotonicity() {
        let s = 10.0;
        assert_eq!(retrievability(0.0, s), 1.0);
        let r_at_s = retrievability(s, s);
        assert!((r_at_s - 0.9).abs() < 0.01, "R(S,S) should be ~0.9, got {r_at_s}");
        let r1 = retrievability(5.0, s);
        let r2 = retrievability(20.0, s);
        assert!(r1 > r2);
        assert!((0.0..=1.0).contains(&r1));
        assert_eq!(retrievability(5.0, 0.0), 0.0);
    }

    #[test]
    fn init_stability_matches_weight_for_rating() {
        let w = DEFAULT_WEIGHTS;
        assert!((init_stability(&w, Rating::Easy) - w[3]).abs() < 1e-9);
    }

    #[test]
    fn difficulty_is_always_clamped() {
        let w = DEFAULT_WEIGHTS;
        for rating in [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy] {
            let d = init_difficulty(&w, rating);
            assert!((1.0..=10.0).contains(&d));
        }
        let extreme = next_difficulty(&w, 50.0, Rating::Again);
        assert!((1.0..=10.0).contains(&extreme));
    }

    #[test]
    fn fuzz_ranges_per_band() {
        assert_eq!(fuzz_bounds(3), 1);
        assert_eq!(fuzz_bounds(6), 1);
        assert_eq!(fuzz_bounds(10), (0.15_f64 * 10.0).round() as i64);
        assert_eq!(fuzz_bounds(100), 20);
        assert_eq!(fuzz_bounds(1000), 30);
    }

    #[test]
    fn fuzz_interval_noop_below_threshold() {
        struct Zero;
        impl Rng for Zero {
            fn next_f64(&mut self) -> f64 {
                0.0
            }
            fn gen_range(&mut self, low: i64, _high: i64) -> i64 {
                low
            }
        }
        let mut rng = Zero;
        assert_eq!(fuzz_interval(2, &mut rng), 2);
        assert_eq!(fuzz_interval(1, &mut rng), 1);
    }

    #[test]
    fn schedule_is_monotonic_across_buttons() {
        let params = FsrsParameters::default();
        let outcomes = schedule(10.0, 5.0, 10, 10, &params).unwrap();
        assert!(outcomes.again.interval_days <= outcomes.hard.interval_days);
        assert!(outcomes.hard.interval_days < outcomes.good.interval_days);
        assert!(outcomes.good.interval_days < outcomes.easy.interval_days);
    }

    #[test]
    fn schedule_rejects_bad_retention() {
        let mut params = FsrsParameters::default();
        params.request_retention = 1.5;
        assert!(schedule(10.0, 5.0, 10, 10, &params).is_err());
    }
}
