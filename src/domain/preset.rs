use serde::{Deserialize, Serialize};

use super::card::{Card, CardState, CardStatus};

/// Named filter over which cards a study session should draw from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyPreset {
    pub tag_filter: Vec<String>,
    pub deck_filter: Vec<i64>,
    pub allow_new: bool,
    pub allow_review: bool,
    pub allow_learning: bool,
    pub is_pinned: bool,
}

impl StudyPreset {
    pub fn matches(&self, card: &Card) -> bool {
        if card.status != CardStatus::Active {
            return false;
        }
        if !self.tag_filter.is_empty() && !self.tag_filter.iter().any(|t| card.has_tag(t)) {
            return false;
        }
        if !self.deck_filter.is_empty() && !self.deck_filter.contains(&card.deck_id) {
            return false;
        }
        let state_allowed = match card.scheduling.state {
            CardState::New => self.allow_new,
            CardState::Review => self.allow_review,
            CardState::Learning | CardState::Relearning => self.allow_learning,
        };
        state_allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_filters_match_any_active_card_in_allowed_states() {
        let preset = StudyPreset {
            allow_new: true,
            allow_review: true,
            allow_learning: true,
            ..Default::default()
        };
        let now = Utc::now();
        let card = Card::new(1, 1, now, now);
        assert!(preset.matches(&card));
    }

    #[test]
    fn tag_filter_excludes_untagged_cards() {
        let preset = StudyPreset {
            tag_filter: vec!["verbs".to_string()],
            allow_new: true,
            allow_review: true,
            allow_learning: true,
            ..Default::default()
        };
        let now = Utc::now();
        let card = Card::new(1, 1, now, now);
        assert!(!preset.matches(&card));
    }
}
