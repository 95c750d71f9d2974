//! Simple in-memory `CardStore`, used by the crate's own unit tests and as a
//! reference implementation for embedders who don't need durability.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::{Card, CardState, CardStatus, ReviewLog};
use crate::error::{CoreError, CoreResult};

use super::{CardStore, DeckStats};

#[derive(Default)]
struct Inner {
    cards: HashMap<i64, Card>,
    logs: HashMap<i64, ReviewLog>,
    next_log_id: i64,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn seed(&self, cards: impl IntoIterator<Item = Card>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for card in cards {
            inner.cards.insert(card.id, card);
        }
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CoreError::StoreUnavailable("memory store mutex poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CardStore for MemoryStore {
    fn get_card(&self, id: i64) -> CoreResult<Option<Card>> {
        Ok(self.lock()?.cards.get(&id).cloned())
    }

    fn update_card(&self, card: &Card) -> CoreResult<()> {
        self.lock()?.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn get_next_cards(&self, deck_id: Option<i64>, limit: usize, now: DateTime<Utc>) -> CoreResult<Vec<Card>> {
        let inner = self.lock()?;
        let mut cards: Vec<Card> = inner
            .cards
            .values()
            .filter(|c| c.is_eligible_for_study(now))
            .filter(|c| deck_id.map(|d| c.deck_id == d).unwrap_or(true))
            .cloned()
            .collect();
        cards.sort_by_key(|c| (c.scheduling.state.priority(), c.due));
        cards.truncate(limit);
        Ok(cards)
    }

    fn add_review_log(&self, log: &ReviewLog) -> CoreResult<i64> {
        let mut inner = self.lock()?;
        let id = if log.id != 0 {
            log.id
        } else {
            inner.next_log_id += 1;
            inner.next_log_id
        };
        let mut stored = log.clone();
        stored.id = id;
        inner.logs.insert(id, stored);
        Ok(id)
    }

    fn get_last_review_log(&self, card_id: i64) -> CoreResult<Option<ReviewLog>> {
        let inner = self.lock()?;
        Ok(inner
            .logs
            .values()
            .filter(|l| l.card_id == card_id)
            .max_by_key(|l| l.reviewed_at)
            .cloned())
    }

    fn delete_review_log(&self, log_id: i64) -> CoreResult<()> {
        self.lock()?.logs.remove(&log_id);
        Ok(())
    }

    fn get_sibling_cards(&self, card_id: i64) -> CoreResult<Vec<Card>> {
        let inner = self.lock()?;
        let Some(card) = inner.cards.get(&card_id) else {
            return Ok(Vec::new());
        };
        let Some(note_id) = card.note_id else {
            return Ok(Vec::new());
        };
        Ok(inner
            .cards
            .values()
            .filter(|c| c.id != card_id && c.note_id == Some(note_id))
            .cloned()
            .collect())
    }

    fn get_buried_cards(&self) -> CoreResult<Vec<Card>> {
        let inner = self.lock()?;
        Ok(inner.cards.values().filter(|c| c.status == CardStatus::Buried).cloned().collect())
    }

    fn get_deck_stats(&self, deck_id: Option<i64>, now: DateTime<Utc>) -> CoreResult<DeckStats> {
        let inner = self.lock()?;
        let mut stats = DeckStats::default();
        for card in inner.cards.values() {
            if deck_id.map(|d| card.deck_id != d).unwrap_or(false) {
                continue;
            }
            stats.total_count += 1;
            match card.status {
                CardStatus::Buried => stats.buried_count += 1,
                CardStatus::Suspended => stats.suspended_count += 1,
                CardStatus::Active => {}
            }
            if card.is_eligible_for_study(now) {
                match card.scheduling.state {
                    CardState::New => stats.new_count += 1,
                    CardState::Learning | CardState::Relearning => stats.learning_count += 1,
                    CardState::Review => stats.review_count += 1,
                }
            }
        }
        Ok(stats)
    }

    fn get_review_logs(&self, deck_id: Option<i64>, since: DateTime<Utc>, until: DateTime<Utc>) -> CoreResult<Vec<ReviewLog>> {
        let inner = self.lock()?;
        let mut logs: Vec<ReviewLog> = inner
            .logs
            .values()
            .filter(|l| l.reviewed_at >= since && l.reviewed_at <= until)
            .filter(|l| {
                deck_id
                    .map(|d| inner.cards.get(&l.card_id).map(|c| c.deck_id == d).unwrap_or(false))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.reviewed_at);
        Ok(logs)
    }

    fn apply_review(&self, card: &Card, log: &ReviewLog) -> CoreResult<i64> {
        let mut inner = self.lock()?;
        inner.cards.insert(card.id, card.clone());
        let id = if log.id != 0 {
            log.id
        } else {
            inner.next_log_id += 1;
            inner.next_log_id
        };
        let mut stored = log.clone();
        stored.id = id;
        inner.logs.insert(id, stored);
        Ok(id)
    }
}
