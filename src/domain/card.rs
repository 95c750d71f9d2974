use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a card in the spaced-repetition lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    /// Ordering used by `Scheduler::get_next_cards`: Relearning < Learning < New < Review.
    pub fn priority(self) -> u8 {
        match self {
            Self::Relearning => 0,
            Self::Learning => 1,
            Self::New => 2,
            Self::Review => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Relearning => "relearning",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "learning" => Some(Self::Learning),
            "review" => Some(Self::Review),
            "relearning" => Some(Self::Relearning),
            _ => None,
        }
    }
}

/// Bury/suspend status, orthogonal to `CardState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Buried,
    Suspended,
}

impl CardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Buried => "buried",
            Self::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "buried" => Some(Self::Buried),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// Per-card memory state tracked by the scheduling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardSchedulingData {
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i64,
    pub scheduled_days: i64,
    pub reps: i64,
    pub lapses: i64,
    pub state: CardState,
    pub last_review: Option<DateTime<Utc>>,
    /// Current step index within a Learning/Relearning step ladder.
    pub step_index: usize,
}

impl CardSchedulingData {
    pub fn new() -> Self {
        Self {
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            state: CardState::New,
            last_review: None,
            step_index: 0,
        }
    }

    /// `state = New ⇔ lastReview = None ⇔ reps = 0`, and `state = Review ⇒ stability > 0`.
    pub fn is_consistent(&self) -> bool {
        let new_iff_no_review = (self.state == CardState::New)
            == (self.last_review.is_none() && self.reps == 0);
        let review_has_stability = self.state != CardState::Review || self.stability > 0.0;
        new_iff_no_review && review_has_stability
    }
}

impl Default for CardSchedulingData {
    fn default() -> Self {
        Self::new()
    }
}

/// A single flashcard: identity, content pointer, and scheduling state.
///
/// The core never reads `front`/`back`/content fields beyond treating `note_id`
/// and `tags` as opaque identifiers for grouping and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub deck_id: i64,
    pub note_id: Option<i64>,
    pub tags: Vec<String>,
    pub status: CardStatus,
    pub due: DateTime<Utc>,
    pub scheduling: CardSchedulingData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(id: i64, deck_id: i64, due: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            deck_id,
            note_id: None,
            tags: Vec::new(),
            status: CardStatus::Active,
            due,
            scheduling: CardSchedulingData::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_eligible_for_study(&self, now: DateTime<Utc>) -> bool {
        self.status == CardStatus::Active && self.due <= now
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
