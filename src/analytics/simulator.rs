//! Monte-Carlo review-load simulator: projects daily review counts forward
//! over a horizon by sampling recall outcomes from each card's predicted
//! retrievability.

use crate::domain::Rating;
use crate::model::fsrs::{self, FsrsParameters};
use crate::rng::Rng;

/// Minimal per-card state the simulator needs; independent of `CardStore`
/// so callers can feed it a plain snapshot of due cards.
#[derive(Debug, Clone, Copy)]
pub struct SimCard {
    pub stability: f64,
    pub difficulty: f64,
    pub due_day: i64,
    pub last_review_day: i64,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub horizon_days: i64,
    pub new_cards_per_day: u32,
    pub iterations: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { horizon_days: 30, new_cards_per_day: 20, iterations: 100 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DailyLoad {
    pub day: i64,
    pub mean: f64,
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub daily_loads: Vec<DailyLoad>,
    pub peak_day: i64,
}

/// Runs `config.iterations` independent day-by-day simulations and
/// aggregates per-day review counts across runs.
pub fn simulate(cards: &[SimCard], params: &FsrsParameters, config: &SimulationConfig, rng: &mut dyn Rng) -> SimulationResult {
    let day_count = (config.horizon_days + 1) as usize;
    let mut per_iteration: Vec<Vec<u32>> = Vec::with_capacity(config.iterations as usize);

    for _ in 0..config.iterations {
        let mut state: Vec<SimCard> = cards.to_vec();
        let mut counts = vec![0u32; day_count];

        for day in 0..=config.horizon_days {
            for card in state.iter_mut() {
                if card.due_day > day {
                    continue;
                }
                let elapsed = (day - card.last_review_day).max(0) as f64;
                let r = fsrs::retrievability(elapsed, card.stability);
                let recalled = rng.next_f64() < r;
                let rating = if !recalled {
                    Rating::Again
                } else {
                    let roll = rng.next_f64();
                    if roll < 0.05 {
                        Rating::Hard
                    } else if roll < 0.85 {
                        Rating::Good
                    } else {
                        Rating::Easy
                    }
                };

                let old_difficulty = card.difficulty;
                let stability = if rating == Rating::Again {
                    fsrs::failure_stability(&params.weights, card.stability, old_difficulty, r)
                } else {
                    fsrs::success_stability(&params.weights, card.stability, old_difficulty, r, rating)
                };
                let interval = if rating == Rating::Again {
                    1
                } else {
                    fsrs::next_interval(stability, params.request_retention, params.maximum_interval).unwrap_or(1)
                };

                card.difficulty = fsrs::next_difficulty(&params.weights, old_difficulty, rating);
                card.stability = stability;
                card.due_day = day + interval;
                card.last_review_day = day;
                counts[day as usize] += 1;
            }

            for _ in 0..config.new_cards_per_day {
                let rating = if rng.next_f64() < 0.70 { Rating::Good } else { Rating::Again };
                let stability = fsrs::init_stability(&params.weights, rating);
                let difficulty = fsrs::init_difficulty(&params.weights, rating);
                let interval = if rating == Rating::Again {
                    1
                } else {
                    fsrs::next_interval(stability, params.request_retention, params.maximum_interval).unwrap_or(1)
                };
                state.push(SimCard { stability, difficulty, due_day: day + interval, last_review_day: day });
                counts[day as usize] += 1;
            }
        }

        per_iteration.push(counts);
    }

    let mut daily_loads = Vec::with_capacity(day_count);
    for day in 0..=config.horizon_days {
        let values: Vec<u32> = per_iteration.iter().map(|c| c[day as usize]).collect();
        let mean = values.iter().copied().sum::<u32>() as f64 / values.len() as f64;
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        daily_loads.push(DailyLoad { day, mean, min, max });
    }
    let peak_day = daily_loads
        .iter()
        .max_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap())
        .map(|d| d.day)
        .unwrap_or(0);

    tracing::info!(iterations = config.iterations, horizon_days = config.horizon_days, peak_day, "simulation complete");
    SimulationResult { daily_loads, peak_day }
}

/// Average daily load with new-card introduction on vs. entirely suspended,
/// holding everything else fixed.
pub fn simulate_retention_change(cards: &[SimCard], params: &FsrsParameters, config: &SimulationConfig, rng: &mut dyn Rng) -> (f64, f64) {
    let with_new = simulate(cards, params, config, rng);
    let mut without = config.clone();
    without.new_cards_per_day = 0;
    let without_new = simulate(cards, params, &without, rng);

    let avg = |r: &SimulationResult| r.daily_loads.iter().map(|d| d.mean).sum::<f64>() / r.daily_loads.len() as f64;
    (avg(&with_new), avg(&without_new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRng;

    #[test]
    fn s6_simulator_produces_nonnegative_bounded_loads() {
        let params = FsrsParameters::default();
        let cards: Vec<SimCard> = (0..50)
            .map(|i| SimCard { stability: 5.0 + i as f64, difficulty: 5.0, due_day: 0, last_review_day: -5 })
            .collect();
        let config = SimulationConfig { horizon_days: 14, new_cards_per_day: 5, iterations: 20 };
        let mut rng = SeededRng::from_seed(7);
        let result = simulate(&cards, &params, &config, &mut rng);

        assert_eq!(result.daily_loads.len(), 15);
        for load in &result.daily_loads {
            assert!(load.min <= load.mean.round() as u32 + 1);
            assert!(load.mean <= load.max as f64 + 0.001);
        }
        assert!(result.peak_day >= 0 && result.peak_day <= 14);
    }

    #[test]
    fn suspending_new_cards_lowers_average_daily_load() {
        let params = FsrsParameters::default();
        let cards: Vec<SimCard> = (0..30)
            .map(|i| SimCard { stability: 10.0 + i as f64, difficulty: 5.0, due_day: 0, last_review_day: -10 })
            .collect();
        let config = SimulationConfig { horizon_days: 20, new_cards_per_day: 15, iterations: 10 };
        let mut rng = SeededRng::from_seed(11);
        let (with_new, without_new) = simulate_retention_change(&cards, &params, &config, &mut rng);
        assert!(without_new <= with_new);
    }
}
