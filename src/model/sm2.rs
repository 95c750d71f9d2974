//! Legacy SM-2 memory model: pure ease-factor and interval-progression functions.

use serde::{Deserialize, Serialize};

use crate::domain::Rating;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sm2Parameters {
    pub initial_ef: f64,
    pub min_ef: f64,
    pub hard_mult: f64,
    pub easy_mult: f64,
    pub graduating_interval: i64,
    pub max_interval: i64,
    pub new_per_day: u32,
    pub review_per_day: u32,
}

impl Default for Sm2Parameters {
    fn default() -> Self {
        Self {
            initial_ef: 2.5,
            min_ef: 1.3,
            hard_mult: 1.2,
            easy_mult: 1.3,
            graduating_interval: 1,
            max_interval: 36_500,
            new_per_day: 20,
            review_per_day: 200,
        }
    }
}

/// Ease-factor delta applied per rating; floored at `min_ef` by the caller.
pub fn ease_delta(rating: Rating) -> f64 {
    match rating {
        Rating::Again => -0.20,
        Rating::Hard => -0.15,
        Rating::Good => 0.0,
        Rating::Easy => 0.15,
    }
}

pub fn next_ease_factor(current_ef: f64, rating: Rating, min_ef: f64) -> f64 {
    (current_ef + ease_delta(rating)).max(min_ef)
}

/// `rep` is the 1-based repetition count *after* this answer (i.e. the value
/// the caller is about to store). `rating = Again` is handled by the caller:
/// it resets `rep` to 0 and routes the card into Relearning rather than
/// calling this function.
pub fn next_interval_days(rep: i64, prev_interval_days: i64, ef: f64, rating: Rating, params: &Sm2Parameters) -> i64 {
    let raw = match rep {
        1 => params.graduating_interval,
        2 => 6,
        _ => match rating {
            Rating::Hard => ((prev_interval_days as f64) * params.hard_mult).round() as i64,
            Rating::Easy => ((prev_interval_days as f64) * ef * params.easy_mult).round() as i64,
            _ => ((prev_interval_days as f64) * ef).round() as i64,
        },
    };
    raw.clamp(1, params.max_interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_factor_floors_at_min() {
        let mut ef = 1.35;
        for _ in 0..5 {
            ef = next_ease_factor(ef, Rating::Again, 1.3);
        }
        assert!(ef >= 1.3);
    }

    #[test]
    fn easy_rating_raises_ease_factor() {
        let ef = next_ease_factor(2.5, Rating::Easy, 1.3);
        assert!((ef - 2.65).abs() < 1e-9);
    }

    #[test]
    fn interval_progression_first_two_reps_fixed() {
        let params = Sm2Parameters::default();
        assert_eq!(next_interval_days(1, 0, 2.5, Rating::Good, &params), 1);
        assert_eq!(next_interval_days(2, 1, 2.5, Rating::Good, &params), 6);
    }

    #[test]
    fn interval_grows_by_ease_factor_afterward() {
        let params = Sm2Parameters::default();
        let next = next_interval_days(3, 6, 2.5, Rating::Good, &params);
        assert_eq!(next, 15);
    }

    #[test]
    fn hard_uses_hard_multiplier_not_ease_factor() {
        let params = Sm2Parameters::default();
        let next = next_interval_days(3, 10, 2.5, Rating::Hard, &params);
        assert_eq!(next, 12);
    }
}
