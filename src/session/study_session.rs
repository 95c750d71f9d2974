//! `StudySession`: a single-owner, in-memory queue over cards fetched from
//! the `CardStore`, answered one at a time through the `Scheduler`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::domain::{Card, CardState, CardStatus, Rating, StudyPreset};
use crate::error::{CoreError, CoreResult};
use crate::gamification;
use crate::rng::Rng;
use crate::scheduler::{ProcessAnswerResult, Scheduler};
use crate::store::CardStore;

#[derive(Debug, Clone)]
pub struct ReviewHistoryEntry {
    pub card_id: i64,
    pub rating: Rating,
    pub time_spent_ms: i64,
    pub log_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionProgress {
    pub completed: usize,
    pub remaining: usize,
    pub new_introduced: usize,
    pub review_studied: usize,
    pub accuracy: f64,
    pub elapsed_ms: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    pub total_cards: usize,
    pub again_count: usize,
    pub hard_count: usize,
    pub good_count: usize,
    pub easy_count: usize,
    pub total_time_ms: i64,
    pub xp: u32,
    pub streak_updated: bool,
}

pub struct StudySession {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<Scheduler>,
    rng: Box<dyn Rng>,
    config: SessionConfig,
    preset: Option<StudyPreset>,
    deck_id: Option<i64>,

    queue: Vec<Card>,
    current_index: usize,
    history: Vec<ReviewHistoryEntry>,

    new_introduced: usize,
    review_studied: usize,
    again_count: usize,
    hard_count: usize,
    good_count: usize,
    easy_count: usize,

    started: bool,
    ended: bool,
    start_time: Option<DateTime<Utc>>,
}

impl StudySession {
    pub fn new(
        store: Arc<dyn CardStore>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<Scheduler>,
        rng: Box<dyn Rng>,
        config: SessionConfig,
        preset: Option<StudyPreset>,
    ) -> Self {
        Self {
            store,
            clock,
            scheduler,
            rng,
            config,
            preset,
            deck_id: None,
            queue: Vec::new(),
            current_index: 0,
            history: Vec::new(),
            new_introduced: 0,
            review_studied: 0,
            again_count: 0,
            hard_count: 0,
            good_count: 0,
            easy_count: 0,
            started: false,
            ended: false,
            start_time: None,
        }
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if !self.started {
            return Err(CoreError::SessionNotStarted);
        }
        if self.ended {
            return Err(CoreError::SessionClosed);
        }
        Ok(())
    }

    pub fn start(&mut self, deck_id: Option<i64>) -> CoreResult<()> {
        let span = tracing::info_span!("study_session_start", ?deck_id);
        let _enter = span.enter();

        self.deck_id = deck_id;
        self.start_time = Some(self.clock.now());
        self.started = true;
        self.ended = false;

        let fetched = self.scheduler.get_next_cards(deck_id, self.config.prefetch_size)?;
        self.queue = match &self.preset {
            Some(preset) => fetched.into_iter().filter(|c| preset.matches(c)).collect(),
            None => fetched,
        };
        self.current_index = 0;
        Ok(())
    }

    pub fn queued_card_ids(&self) -> Vec<i64> {
        self.queue.iter().map(|c| c.id).collect()
    }

    pub fn get_current_card(&self) -> CoreResult<Option<&Card>> {
        self.ensure_active()?;
        Ok(self.queue.get(self.current_index))
    }

    pub fn answer_card(&mut self, rating: Rating, time_spent_ms: i64) -> CoreResult<ProcessAnswerResult> {
        self.ensure_active()?;
        if self.current_index >= self.queue.len() {
            return Err(CoreError::InvalidParameter("no current card".into()));
        }

        let card = self.queue.remove(self.current_index);
        match card.scheduling.state {
            CardState::New => self.new_introduced += 1,
            CardState::Learning | CardState::Relearning | CardState::Review => self.review_studied += 1,
        }

        let result = self.scheduler.process_answer(card.id, rating, time_spent_ms, self.rng.as_mut())?;

        match rating {
            Rating::Again => self.again_count += 1,
            Rating::Hard => self.hard_count += 1,
            Rating::Good => self.good_count += 1,
            Rating::Easy => self.easy_count += 1,
        }

        if self.config.autobury_siblings && card.note_id.is_some() {
            let siblings = self.store.get_sibling_cards(card.id)?;
            let sibling_ids: HashSet<i64> = siblings.iter().map(|s| s.id).collect();
            self.scheduler.bury_daily_siblings(card.id)?;
            self.queue.retain(|c| !sibling_ids.contains(&c.id));
            if self.current_index > self.queue.len() {
                self.current_index = self.queue.len();
            }
        }

        let reinserted_intraday = matches!(result.transition.new_state, CardState::Learning | CardState::Relearning)
            && result.transition.delay_minutes.is_some();
        if reinserted_intraday {
            let offset = 3 + self.rng.gen_range(0, 3) as usize;
            let pos = (self.current_index + offset).min(self.queue.len());
            self.queue.insert(pos, result.card.clone());
        }

        self.history.push(ReviewHistoryEntry {
            card_id: card.id,
            rating,
            time_spent_ms,
            log_id: result.log_id,
        });

        while self.current_index < self.queue.len() && self.queue[self.current_index].status != CardStatus::Active {
            self.current_index += 1;
        }

        if self.queue.len().saturating_sub(self.current_index) < self.config.prefetch_size / 2 {
            self.refill()?;
        }

        Ok(result)
    }

    fn refill(&mut self) -> CoreResult<()> {
        let existing_ids: HashSet<i64> = self.queue.iter().map(|c| c.id).collect();
        let new_budget = self.config.new_card_limit.saturating_sub(self.new_introduced);
        let review_budget = self.config.review_card_limit.saturating_sub(self.review_studied);
        let fetch_limit = self.config.prefetch_size.max(new_budget + review_budget);
        let fetched = self.scheduler.get_next_cards(self.deck_id, fetch_limit)?;

        let mut new_added = 0usize;
        let mut review_added = 0usize;
        for card in fetched {
            if existing_ids.contains(&card.id) {
                continue;
            }
            if let Some(preset) = &self.preset {
                if !preset.matches(&card) {
                    continue;
                }
            }
            match card.scheduling.state {
                CardState::New => {
                    if new_added >= new_budget {
                        continue;
                    }
                    new_added += 1;
                }
                CardState::Learning | CardState::Relearning | CardState::Review => {
                    if review_added >= review_budget {
                        continue;
                    }
                    review_added += 1;
                }
            }
            self.queue.push(card);
        }
        Ok(())
    }

    pub fn skip_card(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.current_index >= self.queue.len() {
            return Err(CoreError::InvalidParameter("no current card".into()));
        }
        let mut card = self.queue.remove(self.current_index);
        card.status = CardStatus::Buried;
        card.updated_at = self.clock.now();
        self.store.update_card(&card)?;
        Ok(())
    }

    pub fn pause_card(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.current_index >= self.queue.len() {
            return Err(CoreError::InvalidParameter("no current card".into()));
        }
        let mut card = self.queue.remove(self.current_index);
        card.status = CardStatus::Suspended;
        card.updated_at = self.clock.now();
        self.store.update_card(&card)?;
        Ok(())
    }

    pub fn undo(&mut self) -> CoreResult<Card> {
        self.ensure_active()?;
        let entry = self.history.pop().ok_or(CoreError::NothingToUndo)?;
        let restored = self.scheduler.undo_last_review(entry.card_id)?;
        match entry.rating {
            Rating::Again => self.again_count = self.again_count.saturating_sub(1),
            Rating::Hard => self.hard_count = self.hard_count.saturating_sub(1),
            Rating::Good => self.good_count = self.good_count.saturating_sub(1),
            Rating::Easy => self.easy_count = self.easy_count.saturating_sub(1),
        }
        let pos = self.current_index.min(self.queue.len());
        self.queue.insert(pos, restored.clone());
        Ok(restored)
    }

    pub fn get_progress(&self) -> SessionProgress {
        let completed = self.history.len();
        let remaining = self.queue.len().saturating_sub(self.current_index);
        let total_answered = self.again_count + self.hard_count + self.good_count + self.easy_count;
        let non_again = self.hard_count + self.good_count + self.easy_count;
        let accuracy = if total_answered == 0 { 0.0 } else { non_again as f64 / total_answered as f64 };
        let elapsed_ms = self
            .start_time
            .map(|s| (self.clock.now() - s).num_milliseconds())
            .unwrap_or(0);
        SessionProgress {
            completed,
            remaining,
            new_introduced: self.new_introduced,
            review_studied: self.review_studied,
            accuracy,
            elapsed_ms,
        }
    }

    pub fn end(&mut self) -> CoreResult<SessionSummary> {
        self.ensure_active()?;
        let span = tracing::info_span!("study_session_end");
        let _enter = span.enter();

        self.ended = true;
        let total_cards = self.history.len();
        let total_time_ms = self
            .start_time
            .map(|s| (self.clock.now() - s).num_milliseconds())
            .unwrap_or(0);
        let total_answered = self.again_count + self.hard_count + self.good_count + self.easy_count;
        let non_again = self.hard_count + self.good_count + self.easy_count;
        let accuracy = if total_answered == 0 { 0.0 } else { non_again as f64 / total_answered as f64 };
        let xp = gamification::session_xp(total_cards, self.config.xp_per_card, accuracy, self.config.accuracy_bonus_multiplier);

        Ok(SessionSummary {
            total_cards,
            again_count: self.again_count,
            hard_count: self.hard_count,
            good_count: self.good_count,
            easy_count: self.easy_count,
            total_time_ms,
            xp,
            streak_updated: total_cards > 0,
        })
    }

    /// Moves the first not-yet-seen (by the caller's bookkeeping) queued card
    /// ahead of the current position. Returns `false` if none qualify.
    pub fn promote_unseen_card(&mut self, seen: &HashSet<i64>) -> bool {
        let Some(pos) = self
            .queue
            .iter()
            .enumerate()
            .skip(self.current_index)
            .find(|(_, c)| !seen.contains(&c.id))
            .map(|(i, _)| i)
        else {
            return false;
        };
        if pos == self.current_index {
            return true;
        }
        let card = self.queue.remove(pos);
        self.queue.insert(self.current_index, card);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::config::{Algorithm, EasyDaysConfig};
    use crate::model::fsrs::FsrsParameters;
    use crate::rng::SeededRng;
    use crate::state_machine::StepConfig;
    use crate::store::memory::MemoryStore;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-14T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn session_with(store: Arc<dyn CardStore>, now: DateTime<Utc>) -> StudySession {
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            Arc::new(FrozenClock(now)),
            Algorithm::Fsrs(FsrsParameters::default()),
            StepConfig::default(),
            EasyDaysConfig::default(),
            20,
        ));
        StudySession::new(
            store,
            Arc::new(FrozenClock(now)),
            scheduler,
            Box::new(SeededRng::from_seed(1)),
            SessionConfig::default(),
            None,
        )
    }

    #[test]
    fn start_populates_queue_from_eligible_cards() {
        let store = Arc::new(MemoryStore::new());
        let n = now();
        store.seed((0..5).map(|i| Card::new(i, 1, n, n)));
        let mut session = session_with(store, n);
        session.start(None).unwrap();
        assert_eq!(session.queued_card_ids().len(), 5);
    }

    #[test]
    fn answer_card_advances_queue_and_records_history() {
        let store = Arc::new(MemoryStore::new());
        let n = now();
        store.seed((0..3).map(|i| Card::new(i, 1, n, n)));
        let mut session = session_with(store, n);
        session.start(None).unwrap();
        let before = session.get_progress().remaining;
        session.answer_card(Rating::Good, 2000).unwrap();
        assert_eq!(session.get_progress().completed, 1);
        assert!(session.get_progress().remaining < before);
    }

    #[test]
    fn answer_card_before_start_fails() {
        let store = Arc::new(MemoryStore::new());
        let n = now();
        let mut session = session_with(store, n);
        assert!(matches!(session.answer_card(Rating::Good, 100), Err(CoreError::SessionNotStarted)));
    }

    #[test]
    fn undo_restores_counter_and_queue_position() {
        let store = Arc::new(MemoryStore::new());
        let n = now();
        store.seed((0..2).map(|i| Card::new(i, 1, n, n)));
        let mut session = session_with(store, n);
        session.start(None).unwrap();
        session.answer_card(Rating::Good, 1000).unwrap();
        assert_eq!(session.get_progress().completed, 1);
        session.undo().unwrap();
        assert_eq!(session.get_progress().completed, 0);
    }

    #[test]
    fn end_computes_accuracy_bonus_xp() {
        let store = Arc::new(MemoryStore::new());
        let n = now();
        store.seed((0..1).map(|i| Card::new(i, 1, n, n)));
        let mut session = session_with(store, n);
        session.start(None).unwrap();
        session.answer_card(Rating::Easy, 1000).unwrap();
        let summary = session.end().unwrap();
        assert_eq!(summary.total_cards, 1);
        assert!(summary.xp > 0);
        assert!(session.answer_card(Rating::Good, 100).is_err());
    }

    #[test]
    fn session_counts_sum_to_total_and_history_length() {
        let store = Arc::new(MemoryStore::new());
        let n = now();
        store.seed((0..4).map(|i| Card::new(i, 1, n, n)));
        let mut session = session_with(store, n);
        session.start(None).unwrap();
        session.answer_card(Rating::Again, 500).unwrap();
        session.answer_card(Rating::Hard, 500).unwrap();
        session.answer_card(Rating::Good, 500).unwrap();
        session.answer_card(Rating::Easy, 500).unwrap();
        let summary = session.end().unwrap();
        let summed = summary.again_count + summary.hard_count + summary.good_count + summary.easy_count;
        assert_eq!(summed, summary.total_cards);
        assert_eq!(summary.total_cards, session.history.len());
    }
}
