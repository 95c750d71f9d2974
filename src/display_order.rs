//! Gathers, sorts, and interleaves a batch of eligible cards into one queue.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Card, CardState};
use crate::model::fsrs;
use crate::rng::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatherOrder {
    Deck,
    DeckRandom,
    AscPos,
    DescPos,
    RandomNotes,
    RandomCards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewSortOrder {
    CardTemplate,
    Random,
    AscPos,
    DescPos,
    GatherOrder,
    ReverseGather,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewSortOrder {
    DueDate,
    DueDateRandom,
    Deck,
    AscInterval,
    DescInterval,
    AscEase,
    DescEase,
    RelativeOverdueness,
    Retrievability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupPlacement {
    Before,
    After,
    Mix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayOrderConfig {
    pub gather_order: GatherOrder,
    pub new_sort_order: NewSortOrder,
    pub review_sort_order: ReviewSortOrder,
    pub interday_learning_vs_review: GroupPlacement,
    pub new_vs_review: GroupPlacement,
}

impl Default for DisplayOrderConfig {
    fn default() -> Self {
        Self {
            gather_order: GatherOrder::Deck,
            new_sort_order: NewSortOrder::CardTemplate,
            review_sort_order: ReviewSortOrder::DueDate,
            interday_learning_vs_review: GroupPlacement::Before,
            new_vs_review: GroupPlacement::Mix,
        }
    }
}

struct Partitions {
    intraday_learning: Vec<Card>,
    interday_learning: Vec<Card>,
    new: Vec<Card>,
    review: Vec<Card>,
}

fn partition(cards: Vec<Card>, now: DateTime<Utc>) -> Partitions {
    let end_of_today = (now + Duration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    let mut p = Partitions {
        intraday_learning: Vec::new(),
        interday_learning: Vec::new(),
        new: Vec::new(),
        review: Vec::new(),
    };
    for card in cards {
        match card.scheduling.state {
            CardState::New => p.new.push(card),
            CardState::Review => p.review.push(card),
            CardState::Learning | CardState::Relearning => {
                if card.due < end_of_today {
                    p.intraday_learning.push(card);
                } else {
                    p.interday_learning.push(card);
                }
            }
        }
    }
    p
}

fn gather_new(mut cards: Vec<Card>, order: GatherOrder, rng: &mut dyn Rng) -> Vec<Card> {
    match order {
        GatherOrder::Deck => {
            cards.sort_by_key(|c| (c.deck_id, c.id));
            cards
        }
        GatherOrder::AscPos => {
            cards.sort_by_key(|c| c.id);
            cards
        }
        GatherOrder::DescPos => {
            cards.sort_by_key(|c| std::cmp::Reverse(c.id));
            cards
        }
        GatherOrder::RandomCards => {
            rng.shuffle(&mut cards);
            cards
        }
        GatherOrder::DeckRandom => shuffle_groups_by(cards, rng, |c| c.deck_id),
        GatherOrder::RandomNotes => {
            shuffle_groups_by(cards, rng, |c| c.note_id.unwrap_or(-c.id))
        }
    }
}

/// Groups cards by `key_fn`, shuffles the *order of groups*, and flattens
/// back out while preserving each group's internal (template) order.
fn shuffle_groups_by(cards: Vec<Card>, rng: &mut dyn Rng, key_fn: impl Fn(&Card) -> i64) -> Vec<Card> {
    let mut order: Vec<i64> = Vec::new();
    let mut groups: HashMap<i64, Vec<Card>> = HashMap::new();
    for card in cards {
        let key = key_fn(&card);
        if !groups.contains_key(&key) {
            order.push(key);
        }
        groups.entry(key).or_default().push(card);
    }
    rng.shuffle(&mut order);
    order.into_iter().flat_map(|key| groups.remove(&key).unwrap_or_default()).collect()
}

fn sort_new(gathered: Vec<Card>, order: NewSortOrder, rng: &mut dyn Rng) -> Vec<Card> {
    let mut cards = gathered;
    match order {
        NewSortOrder::GatherOrder => cards,
        NewSortOrder::ReverseGather => {
            cards.reverse();
            cards
        }
        NewSortOrder::CardTemplate => {
            cards.sort_by_key(|c| (c.note_id.unwrap_or(c.id), c.id));
            cards
        }
        NewSortOrder::AscPos => {
            cards.sort_by_key(|c| c.id);
            cards
        }
        NewSortOrder::DescPos => {
            cards.sort_by_key(|c| std::cmp::Reverse(c.id));
            cards
        }
        NewSortOrder::Random => {
            rng.shuffle(&mut cards);
            cards
        }
    }
}

fn overdue_days(card: &Card, now: DateTime<Utc>) -> f64 {
    (now - card.due).num_seconds() as f64 / 86_400.0
}

fn sort_review(mut cards: Vec<Card>, order: ReviewSortOrder, now: DateTime<Utc>, rng: &mut dyn Rng) -> Vec<Card> {
    match order {
        ReviewSortOrder::DueDate => cards.sort_by_key(|c| c.due),
        ReviewSortOrder::DueDateRandom => {
            cards.sort_by_key(|c| c.due.date_naive());
            rng.shuffle(&mut cards);
            cards.sort_by_key(|c| c.due.date_naive());
        }
        ReviewSortOrder::Deck => cards.sort_by_key(|c| (c.deck_id, c.due)),
        ReviewSortOrder::AscInterval => cards.sort_by_key(|c| c.scheduling.scheduled_days),
        ReviewSortOrder::DescInterval => cards.sort_by_key(|c| std::cmp::Reverse(c.scheduling.scheduled_days)),
        ReviewSortOrder::AscEase => cards.sort_by(|a, b| {
            b.scheduling.difficulty.partial_cmp(&a.scheduling.difficulty).unwrap()
        }),
        ReviewSortOrder::DescEase => cards.sort_by(|a, b| {
            a.scheduling.difficulty.partial_cmp(&b.scheduling.difficulty).unwrap()
        }),
        ReviewSortOrder::RelativeOverdueness => cards.sort_by(|a, b| {
            let ra = overdue_days(a, now) / (a.scheduling.scheduled_days.max(1) as f64);
            let rb = overdue_days(b, now) / (b.scheduling.scheduled_days.max(1) as f64);
            rb.partial_cmp(&ra).unwrap()
        }),
        ReviewSortOrder::Retrievability => cards.sort_by(|a, b| {
            let ea = (now - a.scheduling.last_review.unwrap_or(now)).num_days() as f64;
            let eb = (now - b.scheduling.last_review.unwrap_or(now)).num_days() as f64;
            let ra = fsrs::retrievability(ea, a.scheduling.stability);
            let rb = fsrs::retrievability(eb, b.scheduling.stability);
            ra.partial_cmp(&rb).unwrap()
        }),
    }
    cards
}

/// Places one `small` item every `period = (s+l)/s` positions, starting at
/// `start = (s+l)/(2s)`, so no two `small` items end up adjacent unless
/// `small.len() > large.len() / 2`.
fn interleave(small: Vec<Card>, large: Vec<Card>) -> Vec<Card> {
    let s = small.len();
    let l = large.len();
    if s == 0 {
        return large;
    }
    if l == 0 {
        return small;
    }
    let total = s + l;
    let period = (s + l) as f64 / s as f64;
    let start = (s + l) as f64 / (2.0 * s as f64);

    let mut occupied = vec![false; total];
    let mut positions = Vec::with_capacity(s);
    for k in 0..s {
        let ideal = ((start - 1.0) + (k as f64) * period).round().clamp(0.0, (total - 1) as f64);
        let mut pos = ideal as usize;
        while occupied[pos] {
            pos = (pos + 1).min(total - 1);
        }
        occupied[pos] = true;
        positions.push(pos);
    }

    let mut result: Vec<Option<Card>> = (0..total).map(|_| None).collect();
    let mut small_iter = small.into_iter();
    for &pos in &positions {
        result[pos] = small_iter.next();
    }
    let mut large_iter = large.into_iter();
    for slot in result.iter_mut() {
        if slot.is_none() {
            *slot = large_iter.next();
        }
    }
    result.into_iter().map(|c| c.unwrap()).collect()
}

fn place(a: Vec<Card>, b: Vec<Card>, placement: GroupPlacement) -> Vec<Card> {
    match placement {
        GroupPlacement::Before => {
            let mut out = a;
            out.extend(b);
            out
        }
        GroupPlacement::After => {
            let mut out = b;
            out.extend(a);
            out
        }
        GroupPlacement::Mix => {
            if a.len() <= b.len() {
                interleave(a, b)
            } else {
                interleave(b, a)
            }
        }
    }
}

/// Builds the final study queue from a batch of eligible cards.
pub fn build_queue(cards: Vec<Card>, now: DateTime<Utc>, config: &DisplayOrderConfig, rng: &mut dyn Rng) -> Vec<Card> {
    let partitions = partition(cards, now);

    let gathered_new = gather_new(partitions.new, config.gather_order, rng);
    let sorted_new = sort_new(gathered_new, config.new_sort_order, rng);
    let sorted_review = sort_review(partitions.review, config.review_sort_order, now, rng);

    let review_and_interday = place(
        partitions.interday_learning,
        sorted_review,
        config.interday_learning_vs_review,
    );
    let rest = place(sorted_new, review_and_interday, config.new_vs_review);

    let mut queue = partitions.intraday_learning;
    queue.extend(rest);
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededRng;
    use chrono::Duration as ChronoDuration;

    fn make_card(id: i64, state: CardState, due_offset_secs: i64, now: DateTime<Utc>) -> Card {
        let mut card = Card::new(id, 1, now + ChronoDuration::seconds(due_offset_secs), now);
        card.scheduling.state = state;
        card
    }

    #[test]
    fn intraday_learning_always_leads() {
        let now = Utc::now();
        let mut rng = SeededRng::from_seed(1);
        let cards = vec![
            make_card(1, CardState::Review, -10, now),
            make_card(2, CardState::Learning, -5, now),
            make_card(3, CardState::New, 0, now),
        ];
        let queue = build_queue(cards, now, &DisplayOrderConfig::default(), &mut rng);
        assert_eq!(queue[0].id, 2);
    }

    #[test]
    fn interleave_keeps_all_items_exactly_once() {
        let small: Vec<i32> = vec![1, 2];
        let large: Vec<i32> = (100..110).collect();
        let small_cards: Vec<Card> = small
            .iter()
            .map(|&i| Card::new(i as i64, 1, Utc::now(), Utc::now()))
            .collect();
        let large_cards: Vec<Card> = large
            .iter()
            .map(|&i| Card::new(i as i64, 1, Utc::now(), Utc::now()))
            .collect();
        let merged = interleave(small_cards, large_cards);
        assert_eq!(merged.len(), 12);
        let mut ids: Vec<i64> = merged.iter().map(|c| c.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn interleave_does_not_place_small_items_adjacently() {
        let small_cards: Vec<Card> = (0..3).map(|i| Card::new(i, 1, Utc::now(), Utc::now())).collect();
        let large_cards: Vec<Card> = (10..40).map(|i| Card::new(i, 1, Utc::now(), Utc::now())).collect();
        let small_ids: std::collections::HashSet<i64> = (0..3).collect();
        let merged = interleave(small_cards, large_cards);
        for window in merged.windows(2) {
            let both_small = small_ids.contains(&window[0].id) && small_ids.contains(&window[1].id);
            assert!(!both_small, "two small-group items ended up adjacent");
        }
    }

    #[test]
    fn interleave_matches_worked_example_positions() {
        let small_cards: Vec<Card> = (0..2).map(|i| Card::new(i, 1, Utc::now(), Utc::now())).collect();
        let large_cards: Vec<Card> = (100..110).map(|i| Card::new(i, 1, Utc::now(), Utc::now())).collect();
        let small_ids: std::collections::HashSet<i64> = (0..2).collect();
        let merged = interleave(small_cards, large_cards);
        let small_positions: Vec<usize> = merged
            .iter()
            .enumerate()
            .filter(|(_, c)| small_ids.contains(&c.id))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(small_positions, vec![2, 8]);
    }
}
