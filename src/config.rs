//! Centralizes the configurable values for the scheduling core: algorithm
//! choice, session limits, and easy-day workload shaping. Loadable from TOML
//! via `serde`/`toml` so a host application can ship one config file instead
//! of wiring constants through call sites.

use std::collections::BTreeMap;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::model::fsrs::FsrsParameters;
use crate::model::sm2::Sm2Parameters;
use crate::state_machine::StepConfig;

/// Algorithm-agnostic scheduler facade: a sum type rather than a subclass
/// hierarchy (see DESIGN.md / SPEC_FULL §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Algorithm {
    Fsrs(FsrsParameters),
    Sm2(Sm2Parameters),
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Fsrs(FsrsParameters::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub algorithm: Algorithm,
    pub steps: StepConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            steps: StepConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub prefetch_size: usize,
    pub new_card_limit: usize,
    pub review_card_limit: usize,
    pub autobury_siblings: bool,
    pub xp_per_card: u32,
    pub accuracy_bonus_multiplier: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prefetch_size: 50,
            new_card_limit: 20,
            review_card_limit: 200,
            autobury_siblings: true,
            xp_per_card: 10,
            accuracy_bonus_multiplier: 1.5,
        }
    }
}

/// Per-weekday workload multiplier, keyed by `num_days_from_monday()` (0=Mon..6=Sun)
/// to avoid depending on `chrono::Weekday`'s own (de)serialization support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EasyDaysConfig {
    pub multipliers: BTreeMap<u8, f64>,
}

impl Default for EasyDaysConfig {
    fn default() -> Self {
        Self { multipliers: BTreeMap::new() }
    }
}

impl EasyDaysConfig {
    /// Multiplier for a given weekday; days absent from the map default to 1.0.
    pub fn multiplier(&self, weekday: Weekday) -> f64 {
        self.multipliers
            .get(&weekday.num_days_from_monday())
            .copied()
            .unwrap_or(1.0)
    }

    pub fn set(&mut self, weekday: Weekday, multiplier: f64) {
        self.multipliers.insert(weekday.num_days_from_monday(), multiplier);
    }
}

/// Top-level config, as would be loaded from a single TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
    pub easy_days: EasyDaysConfig,
}

impl CoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_config_matches_documented_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.prefetch_size, 50);
        assert_eq!(cfg.new_card_limit, 20);
        assert_eq!(cfg.review_card_limit, 200);
        assert!(cfg.autobury_siblings);
    }

    #[test]
    fn easy_days_default_to_full_multiplier() {
        let cfg = EasyDaysConfig::default();
        assert_eq!(cfg.multiplier(Weekday::Fri), 1.0);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = CoreConfig::default();
        let s = toml::to_string(&cfg).unwrap();
        let parsed = CoreConfig::from_toml_str(&s).unwrap();
        assert_eq!(parsed.session.prefetch_size, cfg.session.prefetch_size);
    }
}
