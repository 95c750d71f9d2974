//! Pure state-machine transitions over `{New, Learning, Review, Relearning}`.

use serde::{Deserialize, Serialize};

use crate::domain::{CardState, Rating};

/// Step ladders and graduation intervals, configured per deck/preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub learning_steps_minutes: Vec<i64>,
    pub relearning_steps_minutes: Vec<i64>,
    pub graduating_interval: i64,
    pub easy_graduating_interval: i64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            learning_steps_minutes: vec![1, 10],
            relearning_steps_minutes: vec![10],
            graduating_interval: 1,
            easy_graduating_interval: 4,
        }
    }
}

/// Result of applying one rating to a card in a given state/step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub new_state: CardState,
    pub new_step_index: usize,
    /// True only when this transition graduates a card into Review for the
    /// *first* time (from New or Learning) using the configured step-ladder
    /// interval rather than the scheduling algorithm's own formula.
    pub graduated: bool,
    /// True for the Review -> Relearning lapse transition.
    pub lapsed: bool,
    pub delay_minutes: Option<i64>,
    pub interval_days: Option<i64>,
}

fn learning(step: usize, config: &StepConfig) -> Transition {
    let step = step.min(config.learning_steps_minutes.len().saturating_sub(1));
    Transition {
        new_state: CardState::Learning,
        new_step_index: step,
        graduated: false,
        lapsed: false,
        delay_minutes: config.learning_steps_minutes.get(step).copied(),
        interval_days: None,
    }
}

fn relearning(step: usize, config: &StepConfig) -> Transition {
    let step = step.min(config.relearning_steps_minutes.len().saturating_sub(1));
    Transition {
        new_state: CardState::Relearning,
        new_step_index: step,
        graduated: false,
        lapsed: false,
        delay_minutes: config.relearning_steps_minutes.get(step).copied(),
        interval_days: None,
    }
}

fn graduate(interval_days: i64) -> Transition {
    Transition {
        new_state: CardState::Review,
        new_step_index: 0,
        graduated: true,
        lapsed: false,
        delay_minutes: None,
        interval_days: Some(interval_days),
    }
}

/// Returning to Review from Relearning: the card already has an established
/// stability, so the scheduling algorithm (not the step config) supplies
/// the interval.
fn recovered() -> Transition {
    Transition {
        new_state: CardState::Review,
        new_step_index: 0,
        graduated: false,
        lapsed: false,
        delay_minutes: None,
        interval_days: None,
    }
}

fn lapse(config: &StepConfig) -> Transition {
    Transition {
        new_state: CardState::Relearning,
        new_step_index: 0,
        graduated: false,
        lapsed: true,
        delay_minutes: config.relearning_steps_minutes.first().copied(),
        interval_days: None,
    }
}

pub fn transition(rating: Rating, state: CardState, step_index: usize, config: &StepConfig) -> Transition {
    match state {
        CardState::New => match rating {
            Rating::Again | Rating::Hard => learning(0, config),
            Rating::Good => {
                if config.learning_steps_minutes.len() <= 1 {
                    graduate(config.graduating_interval)
                } else {
                    learning(1, config)
                }
            }
            Rating::Easy => graduate(config.easy_graduating_interval),
        },
        CardState::Learning => match rating {
            Rating::Again => learning(0, config),
            Rating::Hard => learning(step_index, config),
            Rating::Good => {
                let next_step = step_index + 1;
                if next_step >= config.learning_steps_minutes.len() {
                    graduate(config.graduating_interval)
                } else {
                    learning(next_step, config)
                }
            }
            Rating::Easy => graduate(config.easy_graduating_interval),
        },
        CardState::Review => match rating {
            Rating::Again => lapse(config),
            _ => Transition {
                new_state: CardState::Review,
                new_step_index: 0,
                graduated: false,
                lapsed: false,
                delay_minutes: None,
                interval_days: None,
            },
        },
        CardState::Relearning => match rating {
            Rating::Again => relearning(0, config),
            Rating::Hard => relearning(step_index, config),
            Rating::Good => {
                let next_step = step_index + 1;
                if next_step >= config.relearning_steps_minutes.len() {
                    recovered()
                } else {
                    relearning(next_step, config)
                }
            }
            Rating::Easy => recovered(),
        },
    }
}

pub fn is_eligible_for_study(status_active: bool, due_le_now: bool) -> bool {
    status_active && due_le_now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_card_easy_graduates_directly() {
        let config = StepConfig::default();
        let t = transition(Rating::Easy, CardState::New, 0, &config);
        assert_eq!(t.new_state, CardState::Review);
        assert!(t.graduated);
        assert_eq!(t.interval_days, Some(4));
    }

    #[test]
    fn new_card_good_enters_second_step() {
        let config = StepConfig::default();
        let t = transition(Rating::Good, CardState::New, 0, &config);
        assert_eq!(t.new_state, CardState::Learning);
        assert_eq!(t.new_step_index, 1);
        assert_eq!(t.delay_minutes, Some(10));
    }

    #[test]
    fn learning_good_past_last_step_graduates() {
        let config = StepConfig::default();
        // step 1 is the last step (len = 2); Good should graduate.
        let t = transition(Rating::Good, CardState::Learning, 1, &config);
        assert_eq!(t.new_state, CardState::Review);
        assert!(t.graduated);
        assert_eq!(t.interval_days, Some(1));
    }

    #[test]
    fn review_again_lapses() {
        let config = StepConfig::default();
        let t = transition(Rating::Again, CardState::Review, 0, &config);
        assert_eq!(t.new_state, CardState::Relearning);
        assert!(t.lapsed);
        assert_eq!(t.delay_minutes, Some(10));
    }

    #[test]
    fn review_good_stays_in_review() {
        let config = StepConfig::default();
        let t = transition(Rating::Good, CardState::Review, 0, &config);
        assert_eq!(t.new_state, CardState::Review);
        assert!(!t.lapsed);
        assert!(t.interval_days.is_none());
    }

    #[test]
    fn relearning_recovers_without_step_config_interval() {
        let config = StepConfig::default();
        let t = transition(Rating::Good, CardState::Relearning, 0, &config);
        assert_eq!(t.new_state, CardState::Review);
        assert!(!t.graduated);
        assert!(t.interval_days.is_none());
    }
}
