//! The `CardStore` abstraction: the sole mutable shared resource the core talks to.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::domain::{Card, ReviewLog};
use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeckStats {
    pub new_count: i64,
    pub learning_count: i64,
    pub review_count: i64,
    pub total_count: i64,
    pub buried_count: i64,
    pub suspended_count: i64,
}

/// Storage contract the scheduling core depends on. Every method may fail
/// with `CoreError::StoreUnavailable`; implementations never panic on I/O.
pub trait CardStore: Send + Sync {
    fn get_card(&self, id: i64) -> CoreResult<Option<Card>>;
    fn update_card(&self, card: &Card) -> CoreResult<()>;
    fn get_next_cards(&self, deck_id: Option<i64>, limit: usize, now: DateTime<Utc>) -> CoreResult<Vec<Card>>;

    fn add_review_log(&self, log: &ReviewLog) -> CoreResult<i64>;
    fn get_last_review_log(&self, card_id: i64) -> CoreResult<Option<ReviewLog>>;
    fn delete_review_log(&self, log_id: i64) -> CoreResult<()>;

    fn get_sibling_cards(&self, card_id: i64) -> CoreResult<Vec<Card>>;
    fn get_buried_cards(&self) -> CoreResult<Vec<Card>>;
    fn get_deck_stats(&self, deck_id: Option<i64>, now: DateTime<Utc>) -> CoreResult<DeckStats>;
    fn get_review_logs(&self, deck_id: Option<i64>, since: DateTime<Utc>, until: DateTime<Utc>) -> CoreResult<Vec<ReviewLog>>;

    /// Atomically applies `card`'s new state and appends `log` as one unit.
    /// The default `update_card`+`add_review_log` pair is NOT atomic on its
    /// own; implementations backing real transactions must override this.
    fn apply_review(&self, card: &Card, log: &ReviewLog) -> CoreResult<i64> {
        self.update_card(card)?;
        self.add_review_log(log)
    }
}
