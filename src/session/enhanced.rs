//! Gamified layer over `StudySession`: bonus cards, insight-card injection,
//! and the micro-feedback event stream.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{Card, Rating};
use crate::error::CoreResult;
use crate::rng::Rng;
use crate::scheduler::ProcessAnswerResult;

use super::feedback::{FeedbackSink, MicroFeedbackEvent, MicroFeedbackKind};
use super::study_session::{SessionSummary, StudySession};

/// Probability a freshly-drawn card is flagged as a bonus card.
const BONUS_CARD_PROBABILITY: f64 = 0.07;
const FAST_ANSWER_MIN_MS: i64 = 500;
const FAST_ANSWER_MAX_MS: i64 = 3000;
const FAST_ANSWER_CHANCE: f64 = 0.15;

pub struct EnhancedStudySession {
    inner: StudySession,
    feedback: Arc<dyn FeedbackSink>,
    rng: Box<dyn Rng>,

    known_ids: HashSet<i64>,
    bonus_card_ids: HashSet<i64>,
    seen_ids: HashSet<i64>,

    streak: u32,
    reviews_since_insight: u32,
    next_insight_at: u32,
}

impl EnhancedStudySession {
    pub fn new(inner: StudySession, feedback: Arc<dyn FeedbackSink>, mut rng: Box<dyn Rng>) -> Self {
        let next_insight_at = 10 + rng.gen_range(0, 6) as u32;
        Self {
            inner,
            feedback,
            rng,
            known_ids: HashSet::new(),
            bonus_card_ids: HashSet::new(),
            seen_ids: HashSet::new(),
            streak: 0,
            reviews_since_insight: 0,
            next_insight_at,
        }
    }

    pub fn start(&mut self, deck_id: Option<i64>) -> CoreResult<()> {
        self.inner.start(deck_id)?;
        self.roll_bonus_cards();
        Ok(())
    }

    /// Re-rolls bonus-card designation for every card newly visible in the
    /// queue (initial fill or a later refill), each getting one independent draw.
    fn roll_bonus_cards(&mut self) {
        for id in self.inner.queued_card_ids() {
            if self.known_ids.insert(id) && self.rng.next_f64() < BONUS_CARD_PROBABILITY {
                self.bonus_card_ids.insert(id);
            }
        }
    }

    pub fn get_current_card(&self) -> CoreResult<Option<&Card>> {
        self.inner.get_current_card()
    }

    pub fn answer_card(&mut self, rating: Rating, time_spent_ms: i64) -> CoreResult<ProcessAnswerResult> {
        let current = self.inner.get_current_card()?.cloned();
        let result = self.inner.answer_card(rating, time_spent_ms)?;
        self.roll_bonus_cards();

        if let Some(card) = current {
            self.seen_ids.insert(card.id);
            self.update_streak(rating);
            self.maybe_emit_speed_event(rating, time_spent_ms);
            self.maybe_emit_bonus_event(card.id);
        }
        self.maybe_inject_insight_card();

        Ok(result)
    }

    fn update_streak(&mut self, rating: Rating) {
        if rating == Rating::Again {
            self.streak = 0;
            return;
        }
        self.streak += 1;
        let milestone = matches!(self.streak, 5 | 10 | 20) || (self.streak > 0 && self.streak % 25 == 0);
        if milestone {
            self.feedback.notify(MicroFeedbackEvent {
                kind: MicroFeedbackKind::Streak,
                message: format!("{} in a row!", self.streak),
                animation: "streak".into(),
                sound: Some("chime".into()),
            });
        }
    }

    fn maybe_emit_speed_event(&mut self, rating: Rating, time_spent_ms: i64) {
        let fast_correct = rating != Rating::Again
            && time_spent_ms > FAST_ANSWER_MIN_MS
            && time_spent_ms < FAST_ANSWER_MAX_MS;
        if fast_correct && self.rng.next_f64() < FAST_ANSWER_CHANCE {
            self.feedback.notify(MicroFeedbackEvent {
                kind: MicroFeedbackKind::Speed,
                message: "Lightning fast!".into(),
                animation: "speed".into(),
                sound: None,
            });
        }
    }

    fn maybe_emit_bonus_event(&mut self, card_id: i64) {
        if self.bonus_card_ids.remove(&card_id) {
            self.feedback.notify(MicroFeedbackEvent {
                kind: MicroFeedbackKind::BonusCard,
                message: "Bonus card complete!".into(),
                animation: "bonus".into(),
                sound: Some("coin".into()),
            });
        }
    }

    fn maybe_inject_insight_card(&mut self) {
        self.reviews_since_insight += 1;
        if self.reviews_since_insight < self.next_insight_at {
            return;
        }
        self.reviews_since_insight = 0;
        self.next_insight_at = 10 + self.rng.gen_range(0, 6) as u32;
        if self.inner.promote_unseen_card(&self.seen_ids) {
            self.feedback.notify(MicroFeedbackEvent {
                kind: MicroFeedbackKind::Milestone,
                message: "Insight card ahead".into(),
                animation: "insight".into(),
                sound: None,
            });
        }
    }

    pub fn end(&mut self) -> CoreResult<SessionSummary> {
        self.inner.end()
    }
}
