//! Pure XP, level, and streak-tier formulas layered on top of session results.

/// `xp = round(totalCards · xpPerCard · bonus)`, `bonus = accuracyBonusMultiplier`
/// when `accuracy ≥ 0.8`, else `1.0`.
pub fn session_xp(total_cards: usize, xp_per_card: u32, accuracy: f64, accuracy_bonus_multiplier: f64) -> u32 {
    let bonus = if accuracy >= 0.8 { accuracy_bonus_multiplier } else { 1.0 };
    ((total_cards as f64) * (xp_per_card as f64) * bonus).round() as u32
}

/// XP required to reach `level` from zero: `100 · level²`.
pub fn xp_for_level(level: u32) -> u32 {
    100 * level * level
}

pub fn level_from_xp(xp: u32) -> u32 {
    let mut level = 0;
    while xp_for_level(level + 1) <= xp {
        level += 1;
    }
    level
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTier {
    None,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// Bronze at 1 day, Silver at a week, Gold at a month, Platinum past that.
pub fn streak_tier(streak_days: u32) -> StreakTier {
    match streak_days {
        0 => StreakTier::None,
        1..=6 => StreakTier::Bronze,
        7..=29 => StreakTier::Silver,
        30..=99 => StreakTier::Gold,
        _ => StreakTier::Platinum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_at_or_above_threshold_applies_bonus() {
        let xp = session_xp(10, 10, 0.8, 1.5);
        assert_eq!(xp, 150);
    }

    #[test]
    fn accuracy_below_threshold_gets_no_bonus() {
        let xp = session_xp(10, 10, 0.79, 1.5);
        assert_eq!(xp, 100);
    }

    #[test]
    fn level_from_xp_matches_quadratic_curve() {
        assert_eq!(level_from_xp(0), 0);
        assert_eq!(level_from_xp(99), 0);
        assert_eq!(level_from_xp(100), 1);
        assert_eq!(level_from_xp(399), 1);
        assert_eq!(level_from_xp(400), 2);
    }

    #[test]
    fn streak_tier_boundaries() {
        assert_eq!(streak_tier(0), StreakTier::None);
        assert_eq!(streak_tier(1), StreakTier::Bronze);
        assert_eq!(streak_tier(7), StreakTier::Silver);
        assert_eq!(streak_tier(30), StreakTier::Gold);
        assert_eq!(streak_tier(100), StreakTier::Platinum);
    }
}
