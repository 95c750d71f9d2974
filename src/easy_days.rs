//! Deterministic per-weekday workload shaping ("easy days").

use chrono::{Datelike, Duration, NaiveDate};

use crate::config::EasyDaysConfig;

/// Stable pseudo-random value in `[0, 1)` derived from an ISO date string.
/// FNV-1a keeps this deterministic across runs/platforms without pulling in
/// a hashing crate for a single 64-bit hash.
fn stable_hash_unit(s: &str) -> f64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash as f64) / (u64::MAX as f64)
}

/// Rank a candidate shift: lower is better. Prefers higher multiplier, then
/// an earlier date ("bringing the review forward") over a later one, then
/// whichever is numerically closer to the original due date.
fn rank(multiplier: f64, offset_days: i64) -> (i64, i64, i64) {
    let multiplier_rank = (-(multiplier * 1_000_000.0)).round() as i64;
    let direction_rank = if offset_days < 0 { 0 } else { 1 };
    (multiplier_rank, direction_rank, offset_days.abs())
}

/// Shift `due` to the nearest acceptable day if its weekday is an easy day.
pub fn shift_due_date(due: NaiveDate, config: &EasyDaysConfig) -> NaiveDate {
    let base_multiplier = config.multiplier(due.weekday());
    if base_multiplier >= 1.0 {
        return due;
    }
    let hash = stable_hash_unit(&due.format("%Y-%m-%d").to_string());
    if hash <= base_multiplier {
        return due;
    }

    let mut best: Option<(NaiveDate, (i64, i64, i64))> = None;
    for offset in [1_i64, -1, 2, -2, 3] {
        let candidate = due + Duration::days(offset);
        let multiplier = config.multiplier(candidate.weekday());
        let score = rank(multiplier, offset);
        if best.as_ref().map(|(_, best_score)| score < *best_score).unwrap_or(true) {
            best = Some((candidate, score));
        }
    }
    best.map(|(date, _)| date).unwrap_or(due)
}

/// `max(1, round(base_limit * multiplier))`, applied only when both are positive.
pub fn effective_daily_limit(base_limit: u32, multiplier: f64) -> u32 {
    if base_limit == 0 || multiplier <= 0.0 {
        return base_limit;
    }
    ((base_limit as f64 * multiplier).round() as u32).max(1)
}
