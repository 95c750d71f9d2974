//! Algorithm-agnostic scheduling facade: pure review computation, persisted
//! answer processing, undo, sibling burying, and day-level stats.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::{Algorithm, EasyDaysConfig};
use crate::domain::{Card, CardSchedulingData, CardState, Rating, ReviewLog};
use crate::easy_days;
use crate::error::{CoreError, CoreResult};
use crate::model::{fsrs, sm2};
use crate::rng::Rng;
use crate::state_machine::{self, StepConfig, Transition};
use crate::store::CardStore;

/// Result of the pure scheduling computation for a single rating.
#[derive(Debug, Clone)]
pub struct ScheduledCard {
    pub scheduling: CardSchedulingData,
    pub due: DateTime<Utc>,
    pub transition: Transition,
}

#[derive(Debug, Clone)]
pub struct ProcessAnswerResult {
    pub card: Card,
    pub log_id: i64,
    pub transition: Transition,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StudyStats {
    pub new_count: i64,
    pub learning_count: i64,
    pub review_count: i64,
    pub total_count: i64,
    pub buried_count: i64,
    pub suspended_count: i64,
    pub accuracy_30d: f64,
    pub estimated_minutes: i64,
}

pub struct Scheduler {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
    algorithm: Algorithm,
    steps: StepConfig,
    easy_days: EasyDaysConfig,
    new_card_daily_limit: usize,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn CardStore>,
        clock: Arc<dyn Clock>,
        algorithm: Algorithm,
        steps: StepConfig,
        easy_days: EasyDaysConfig,
        new_card_daily_limit: usize,
    ) -> Self {
        Self { store, clock, algorithm, steps, easy_days, new_card_daily_limit }
    }

    /// Pure: computes the new scheduling state and due date for one rating.
    /// Never mutates the store and never touches the RNG — fuzz is applied
    /// only by `process_answer`.
    pub fn schedule_review(&self, scheduling: &CardSchedulingData, rating: Rating, now: DateTime<Utc>) -> CoreResult<ScheduledCard> {
        let transition = state_machine::transition(rating, scheduling.state, scheduling.step_index, &self.steps);
        let elapsed_days = scheduling
            .last_review
            .map(|lr| (now - lr).num_days().max(0))
            .unwrap_or(0);
        let new_reps = scheduling.reps + 1;
        let new_lapses = scheduling.lapses + if transition.lapsed { 1 } else { 0 };

        let (new_stability, new_difficulty, computed_interval) = match &self.algorithm {
            Algorithm::Fsrs(params) => {
                params.validate()?;
                let w = &params.weights;
                let (stability, difficulty) = if scheduling.state == CardState::New {
                    (fsrs::init_stability(w, rating), fsrs::init_difficulty(w, rating))
                } else if scheduling.state == CardState::Review {
                    let r = fsrs::retrievability(elapsed_days as f64, scheduling.stability);
                    let stability = if rating == Rating::Again {
                        fsrs::failure_stability(w, scheduling.stability, scheduling.difficulty, r)
                    } else {
                        fsrs::success_stability(w, scheduling.stability, scheduling.difficulty, r, rating)
                    };
                    (stability, fsrs::next_difficulty(w, scheduling.difficulty, rating))
                } else {
                    (
                        fsrs::short_term_stability(w, scheduling.stability.max(0.01), rating),
                        fsrs::next_difficulty(w, scheduling.difficulty, rating),
                    )
                };
                let interval = if transition.graduated {
                    transition.interval_days
                } else if transition.interval_days.is_none() && transition.new_state == CardState::Review {
                    Some(fsrs::next_interval(stability, params.request_retention, params.maximum_interval)?)
                } else {
                    None
                };
                (stability, difficulty, interval)
            }
            Algorithm::Sm2(params) => {
                // Ease factor lives in `stability` (the generic memory-strength
                // slot); SM-2 has no separate difficulty axis, so `difficulty`
                // is left at 0 for SM-2-scheduled cards.
                let ease = sm2::next_ease_factor(
                    if scheduling.stability > 0.0 { scheduling.stability } else { params.initial_ef },
                    rating,
                    params.min_ef,
                );
                let interval = if transition.graduated {
                    transition.interval_days
                } else if transition.interval_days.is_none() && transition.new_state == CardState::Review {
                    Some(sm2::next_interval_days(new_reps, scheduling.scheduled_days, ease, rating, params))
                } else {
                    None
                };
                (ease, 0.0, interval)
            }
        };

        let scheduled_days = computed_interval.unwrap_or(scheduling.scheduled_days);
        let due = match transition.delay_minutes {
            Some(minutes) => now + Duration::minutes(minutes),
            None => now + Duration::days(scheduled_days),
        };

        let new_scheduling = CardSchedulingData {
            stability: new_stability,
            difficulty: new_difficulty,
            elapsed_days,
            scheduled_days,
            reps: new_reps,
            lapses: new_lapses,
            state: transition.new_state,
            last_review: Some(now),
            step_index: transition.new_step_index,
        };

        Ok(ScheduledCard { scheduling: new_scheduling, due, transition })
    }

    /// Loads, schedules, fuzzes (FSRS review intervals > 2 days only), shifts
    /// for easy days, and persists the card update + log append as one unit.
    pub fn process_answer(&self, card_id: i64, rating: Rating, time_spent_ms: i64, rng: &mut dyn Rng) -> CoreResult<ProcessAnswerResult> {
        let span = tracing::info_span!("process_answer", card_id, rating = rating.as_str());
        let _enter = span.enter();

        let now = self.clock.now();
        let card = self.store.get_card(card_id)?.ok_or(CoreError::CardNotFound(card_id))?;
        let mut scheduled = self.schedule_review(&card.scheduling, rating, now)?;

        let is_review_interval = matches!(self.algorithm, Algorithm::Fsrs(_))
            && scheduled.transition.new_state == CardState::Review
            && scheduled.scheduling.scheduled_days > 2;
        if is_review_interval {
            let fuzzed = fsrs::fuzz_interval(scheduled.scheduling.scheduled_days, rng);
            scheduled.scheduling.scheduled_days = fuzzed;
            scheduled.due = now + Duration::days(fuzzed);
        }

        if scheduled.transition.delay_minutes.is_none() {
            let shifted_date = easy_days::shift_due_date(scheduled.due.date_naive(), &self.easy_days);
            if shifted_date != scheduled.due.date_naive() {
                scheduled.due = shifted_date.and_time(scheduled.due.time()).and_utc();
            }
        }

        let card_after = Card {
            scheduling: scheduled.scheduling,
            due: scheduled.due,
            updated_at: now,
            ..card.clone()
        };

        let log = ReviewLog {
            id: 0,
            card_id,
            rating,
            scheduling_before: card.scheduling,
            scheduling_after: scheduled.scheduling,
            due_before: card.due,
            due_after: scheduled.due,
            reviewed_at: now,
            time_spent_ms,
        };

        let log_id = self.store.apply_review(&card_after, &log)?;
        Ok(ProcessAnswerResult { card: card_after, log_id, transition: scheduled.transition })
    }

    /// Restores a card to the state just before its most recent review.
    pub fn undo_last_review(&self, card_id: i64) -> CoreResult<Card> {
        let span = tracing::info_span!("undo_last_review", card_id);
        let _enter = span.enter();

        let log = self.store.get_last_review_log(card_id)?.ok_or(CoreError::NothingToUndo)?;
        let card = self.store.get_card(card_id)?.ok_or(CoreError::CardNotFound(card_id))?;
        let restored = Card {
            scheduling: log.scheduling_before,
            due: log.due_before,
            updated_at: self.clock.now(),
            ..card
        };
        self.store.update_card(&restored)?;
        self.store.delete_review_log(log.id)?;
        Ok(restored)
    }

    pub fn get_next_cards(&self, deck_id: Option<i64>, limit: usize) -> CoreResult<Vec<Card>> {
        let now = self.clock.now();
        let mut cards = self.store.get_next_cards(deck_id, limit, now)?;
        cards.sort_by_key(|c| (c.scheduling.state.priority(), c.due));
        Ok(cards)
    }

    pub fn bury_daily_siblings(&self, card_id: i64) -> CoreResult<usize> {
        let now = self.clock.now();
        let siblings = self.store.get_sibling_cards(card_id)?;
        let mut count = 0;
        for mut sibling in siblings {
            if sibling.status == crate::domain::CardStatus::Active {
                sibling.status = crate::domain::CardStatus::Buried;
                sibling.updated_at = now;
                self.store.update_card(&sibling)?;
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn unbury_all(&self) -> CoreResult<usize> {
        let now = self.clock.now();
        let buried = self.store.get_buried_cards()?;
        let mut count = 0;
        for mut card in buried {
            card.status = crate::domain::CardStatus::Active;
            card.updated_at = now;
            self.store.update_card(&card)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get_study_stats(&self, deck_id: Option<i64>) -> CoreResult<StudyStats> {
        let now = self.clock.now();
        let deck_stats = self.store.get_deck_stats(deck_id, now)?;
        let logs = self.store.get_review_logs(deck_id, now - Duration::days(30), now)?;
        let accuracy_30d = if logs.is_empty() {
            0.0
        } else {
            logs.iter().filter(|l| l.rating.is_correct()).count() as f64 / logs.len() as f64
        };
        let counted_new = deck_stats.new_count.min(self.new_card_daily_limit as i64);
        let estimated_minutes = ((deck_stats.review_count * 8 + deck_stats.learning_count * 12 + counted_new * 20) as f64 / 60.0).ceil() as i64;

        Ok(StudyStats {
            new_count: deck_stats.new_count,
            learning_count: deck_stats.learning_count,
            review_count: deck_stats.review_count,
            total_count: deck_stats.total_count,
            buried_count: deck_stats.buried_count,
            suspended_count: deck_stats.suspended_count,
            accuracy_30d,
            estimated_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::model::fsrs::FsrsParameters;
    use crate::rng::SeededRng;
    use crate::store::memory::MemoryStore;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-14T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn scheduler_with(store: Arc<dyn CardStore>, now: DateTime<Utc>) -> Scheduler {
        Scheduler::new(
            store,
            Arc::new(FrozenClock(now)),
            Algorithm::Fsrs(FsrsParameters::default()),
            StepConfig::default(),
            EasyDaysConfig::default(),
            20,
        )
    }

    #[test]
    fn s1_new_card_easy_graduates_with_w3_stability() {
        let store: Arc<dyn CardStore> = Arc::new(MemoryStore::new());
        let now = fixed_now();
        let scheduler = scheduler_with(store, now);
        let scheduling = CardSchedulingData::new();
        let result = scheduler.schedule_review(&scheduling, Rating::Easy, now).unwrap();
        assert_eq!(result.scheduling.state, CardState::Review);
        assert_eq!(result.scheduling.reps, 1);
        assert_eq!(result.scheduling.scheduled_days, 4);
        assert_eq!(result.due, now + Duration::days(4));
        assert!((result.scheduling.stability - fsrs::DEFAULT_WEIGHTS[3]).abs() < 1e-9);
    }

    #[test]
    fn s3_review_again_enters_relearning() {
        let store: Arc<dyn CardStore> = Arc::new(MemoryStore::new());
        let now = fixed_now();
        let scheduler = scheduler_with(store, now);
        let scheduling = CardSchedulingData {
            stability: 10.0,
            difficulty: 5.0,
            state: CardState::Review,
            last_review: Some(now - Duration::days(10)),
            reps: 3,
            lapses: 0,
            elapsed_days: 10,
            scheduled_days: 10,
            step_index: 0,
        };
        let result = scheduler.schedule_review(&scheduling, Rating::Again, now).unwrap();
        assert_eq!(result.scheduling.state, CardState::Relearning);
        assert_eq!(result.scheduling.lapses, 1);
        assert!(result.transition.lapsed);
        assert_eq!(result.due, now + Duration::minutes(10));
    }

    #[test]
    fn process_answer_persists_card_and_log() {
        let store = Arc::new(MemoryStore::new());
        let now = fixed_now();
        store.update_card(&Card::new(1, 1, now, now)).unwrap();
        let scheduler = scheduler_with(store.clone(), now);
        let mut rng = SeededRng::from_seed(1);
        let result = scheduler.process_answer(1, Rating::Good, 1500, &mut rng).unwrap();
        assert_eq!(result.card.scheduling.reps, 1);
        assert!(store.get_last_review_log(1).unwrap().is_some());
    }

    #[test]
    fn s4_undo_restores_prior_scheduling_and_removes_log() {
        let store = Arc::new(MemoryStore::new());
        let now = fixed_now();
        let scheduling = CardSchedulingData {
            stability: 10.0,
            difficulty: 5.0,
            state: CardState::Review,
            last_review: Some(now - Duration::days(10)),
            reps: 3,
            lapses: 0,
            elapsed_days: 10,
            scheduled_days: 10,
            step_index: 0,
        };
        let mut card = Card::new(1, 1, now, now);
        card.scheduling = scheduling;
        store.update_card(&card).unwrap();
        let scheduler = scheduler_with(store.clone(), now);
        let mut rng = SeededRng::from_seed(1);

        scheduler.process_answer(1, Rating::Again, 1000, &mut rng).unwrap();
        assert_eq!(store.get_card(1).unwrap().unwrap().scheduling.state, CardState::Relearning);

        let restored = scheduler.undo_last_review(1).unwrap();
        assert_eq!(restored.scheduling.state, CardState::Review);
        assert_eq!(restored.scheduling.lapses, 0);
        assert!(store.get_last_review_log(1).unwrap().is_none());
    }

    #[test]
    fn bury_daily_siblings_only_affects_active_siblings() {
        let store = Arc::new(MemoryStore::new());
        let now = fixed_now();
        let mut a = Card::new(1, 1, now, now);
        a.note_id = Some(7);
        let mut b = Card::new(2, 1, now, now);
        b.note_id = Some(7);
        store.update_card(&a).unwrap();
        store.update_card(&b).unwrap();
        let scheduler = scheduler_with(store.clone(), now);
        let count = scheduler.bury_daily_siblings(1).unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.get_card(2).unwrap().unwrap().status, crate::domain::CardStatus::Buried);
    }
}
