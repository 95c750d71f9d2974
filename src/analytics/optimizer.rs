//! Offline FSRS parameter optimizer: fits weights to historical review logs
//! via Adam over central finite-difference gradients of a retrievability
//! prediction loss. Never fails outright; always returns the best weights seen.

use std::collections::HashMap;

use crate::domain::{CardState, Rating, ReviewLog};
use crate::model::fsrs::{self, Weights, NUM_WEIGHTS};

const LEARNING_RATE: f64 = 0.005;
const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;
const MAX_ITERATIONS: u32 = 500;
const EARLY_STOP_AFTER: u32 = 50;
const EARLY_STOP_DELTA: f64 = 1e-7;
const MIN_REVIEWS_FOR_OPTIMIZATION: usize = 400;

/// Per-weight clamp bounds so a fitted parameter set stays numerically sane.
const WEIGHT_BOUNDS: [(f64, f64); NUM_WEIGHTS] = [
    (0.01, 100.0), (0.01, 100.0), (0.01, 100.0), (0.01, 100.0),
    (1.0, 10.0), (0.001, 4.0), (0.001, 4.0), (0.001, 0.75),
    (0.0, 4.5), (0.0, 0.8), (0.001, 3.5), (0.001, 5.0),
    (0.001, 0.25), (0.001, 0.9), (0.0, 4.0), (0.0, 1.0),
    (1.0, 6.0), (0.0, 2.0), (0.0, 0.8),
];

fn clamp_weights(w: &mut Weights) {
    for (value, (low, high)) in w.iter_mut().zip(WEIGHT_BOUNDS.iter()) {
        *value = value.clamp(*low, *high);
    }
}

/// Groups logs by card id, preserving first-seen order, sorted chronologically within each group.
fn group_by_card(logs: &[ReviewLog]) -> Vec<Vec<&ReviewLog>> {
    let mut order: Vec<i64> = Vec::new();
    let mut groups: HashMap<i64, Vec<&ReviewLog>> = HashMap::new();
    for log in logs {
        groups.entry(log.card_id).or_insert_with(|| {
            order.push(log.card_id);
            Vec::new()
        }).push(log);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|l| l.reviewed_at);
    }
    order.into_iter().map(|id| groups.remove(&id).unwrap_or_default()).collect()
}

/// RMS error between predicted retrievability and actual recall, scored on
/// every event after each card's first where the prior state already carried
/// an established memory (Review or Relearning).
fn loss(logs: &[ReviewLog], weights: &Weights) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;

    for group in group_by_card(logs) {
        let mut iter = group.into_iter();
        let Some(first) = iter.next() else { continue };
        let mut stability = fsrs::init_stability(weights, first.rating);
        let mut difficulty = fsrs::init_difficulty(weights, first.rating);
        let mut last_review = first.reviewed_at;

        for log in iter {
            let scored = matches!(log.scheduling_before.state, CardState::Review | CardState::Relearning);
            let elapsed = (log.reviewed_at - last_review).num_days().max(0) as f64;
            let predicted = fsrs::retrievability(elapsed, stability);
            if scored {
                let actual = if log.rating.is_correct() { 1.0 } else { 0.0 };
                sum_sq += (predicted - actual).powi(2);
                count += 1;
            }

            let old_difficulty = difficulty;
            stability = if log.rating == Rating::Again {
                fsrs::failure_stability(weights, stability, old_difficulty, predicted)
            } else {
                fsrs::success_stability(weights, stability, old_difficulty, predicted, log.rating)
            };
            difficulty = fsrs::next_difficulty(weights, old_difficulty, log.rating);
            last_review = log.reviewed_at;
        }
    }

    if count == 0 { 0.0 } else { (sum_sq / count as f64).sqrt() }
}

pub fn has_enough_data(logs: &[ReviewLog]) -> bool {
    logs.len() >= MIN_REVIEWS_FOR_OPTIMIZATION
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub weights: Weights,
    pub final_loss: f64,
    pub iterations_run: u32,
}

/// Adam optimizer over central finite-difference gradients of `loss`.
pub fn optimize(logs: &[ReviewLog], initial_weights: Weights) -> OptimizationResult {
    let mut weights = initial_weights;
    clamp_weights(&mut weights);
    let mut m = [0.0_f64; NUM_WEIGHTS];
    let mut v = [0.0_f64; NUM_WEIGHTS];

    let mut best_weights = weights;
    let mut best_loss = loss(logs, &weights);
    let mut prev_loss = best_loss;
    let mut iterations_run = 0;

    for iter in 1..=MAX_ITERATIONS {
        iterations_run = iter;
        let mut gradient = [0.0_f64; NUM_WEIGHTS];
        for i in 0..NUM_WEIGHTS {
            let h = (weights[i].abs() * 1e-4).max(1e-4);
            let mut plus = weights;
            let mut minus = weights;
            plus[i] += h;
            minus[i] -= h;
            gradient[i] = (loss(logs, &plus) - loss(logs, &minus)) / (2.0 * h);
        }

        for i in 0..NUM_WEIGHTS {
            m[i] = BETA1 * m[i] + (1.0 - BETA1) * gradient[i];
            v[i] = BETA2 * v[i] + (1.0 - BETA2) * gradient[i] * gradient[i];
            let m_hat = m[i] / (1.0 - BETA1.powi(iter as i32));
            let v_hat = v[i] / (1.0 - BETA2.powi(iter as i32));
            weights[i] -= LEARNING_RATE * m_hat / (v_hat.sqrt() + EPSILON);
        }
        clamp_weights(&mut weights);

        let current_loss = loss(logs, &weights);
        if current_loss < best_loss {
            best_loss = current_loss;
            best_weights = weights;
        }

        if iter > EARLY_STOP_AFTER && (prev_loss - current_loss).abs() < EARLY_STOP_DELTA {
            tracing::info!(iteration = iter, loss = current_loss, "optimizer early-stopped");
            break;
        }
        prev_loss = current_loss;
    }

    tracing::info!(iterations_run, final_loss = best_loss, "optimizer finished");
    OptimizationResult { weights: best_weights, final_loss: best_loss, iterations_run }
}

/// `R = 0.85 + 0.05·σ((avgS − 30) / 20)`, rounded to 2 decimals, averaged
/// over cards with at least 3 logged events. Falls back to 0.9 with no
/// qualifying cards.
pub fn recommend_retention(logs: &[ReviewLog], weights: &Weights) -> f64 {
    let mut total_stability = 0.0;
    let mut qualifying = 0usize;

    for group in group_by_card(logs) {
        if group.len() < 3 {
            continue;
        }
        let mut iter = group.into_iter();
        let first = iter.next().unwrap();
        let mut stability = fsrs::init_stability(weights, first.rating);
        let mut difficulty = fsrs::init_difficulty(weights, first.rating);
        let mut last_review = first.reviewed_at;
        for log in iter {
            let elapsed = (log.reviewed_at - last_review).num_days().max(0) as f64;
            let r = fsrs::retrievability(elapsed, stability);
            let old_difficulty = difficulty;
            stability = if log.rating == Rating::Again {
                fsrs::failure_stability(weights, stability, old_difficulty, r)
            } else {
                fsrs::success_stability(weights, stability, old_difficulty, r, log.rating)
            };
            difficulty = fsrs::next_difficulty(weights, old_difficulty, log.rating);
            last_review = log.reviewed_at;
        }
        total_stability += stability;
        qualifying += 1;
    }

    if qualifying == 0 {
        return 0.9;
    }
    let avg_stability = total_stability / qualifying as f64;
    let sigmoid = 1.0 / (1.0 + (-(avg_stability - 30.0) / 20.0).exp());
    ((0.85 + 0.05 * sigmoid) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CardSchedulingData;
    use chrono::{DateTime, Duration, Utc};

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn make_log(id: i64, card_id: i64, rating: Rating, day: i64, prior_state: CardState) -> ReviewLog {
        let mut scheduling_before = CardSchedulingData::new();
        scheduling_before.state = prior_state;
        let scheduling_after = scheduling_before;
        let when = base_time() + Duration::days(day);
        ReviewLog {
            id,
            card_id,
            rating,
            scheduling_before,
            scheduling_after,
            due_before: when,
            due_after: when,
            reviewed_at: when,
            time_spent_ms: 2000,
        }
    }

    #[test]
    fn has_enough_data_respects_threshold() {
        let logs: Vec<ReviewLog> = (0..399).map(|i| make_log(i, 1, Rating::Good, i, CardState::Review)).collect();
        assert!(!has_enough_data(&logs));
        let logs: Vec<ReviewLog> = (0..400).map(|i| make_log(i, 1, Rating::Good, i, CardState::Review)).collect();
        assert!(has_enough_data(&logs));
    }

    #[test]
    fn optimize_never_returns_worse_than_initial_loss() {
        let mut logs = Vec::new();
        for card in 0..5 {
            for day in 0..10 {
                logs.push(make_log(card * 10 + day, card, Rating::Good, day * 3, CardState::Review));
            }
        }
        let initial = fsrs::DEFAULT_WEIGHTS;
        let initial_loss = loss(&logs, &initial);
        let result = optimize(&logs, initial);
        assert!(result.final_loss <= initial_loss + 1e-9);
        for (value, (low, high)) in result.weights.iter().zip(WEIGHT_BOUNDS.iter()) {
            assert!(*value >= *low && *value <= *high);
        }
    }

    #[test]
    fn recommend_retention_falls_back_without_qualifying_cards() {
        let logs = vec![make_log(1, 1, Rating::Good, 0, CardState::New)];
        assert_eq!(recommend_retention(&logs, &fsrs::DEFAULT_WEIGHTS), 0.9);
    }

    #[test]
    fn recommend_retention_stays_in_documented_range() {
        let mut logs = Vec::new();
        for day in 0..6 {
            logs.push(make_log(day, 1, Rating::Good, day * 5, CardState::Review));
        }
        let r = recommend_retention(&logs, &fsrs::DEFAULT_WEIGHTS);
        assert!((0.85..=0.90).contains(&r));
    }
}
