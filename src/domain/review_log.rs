use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::card::CardSchedulingData;
use super::rating::Rating;

/// Immutable, append-only record of a single answered review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub id: i64,
    pub card_id: i64,
    pub rating: Rating,
    pub scheduling_before: CardSchedulingData,
    pub scheduling_after: CardSchedulingData,
    pub due_before: DateTime<Utc>,
    pub due_after: DateTime<Utc>,
    pub reviewed_at: DateTime<Utc>,
    pub time_spent_ms: i64,
}
