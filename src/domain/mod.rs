pub mod card;
pub mod preset;
pub mod rating;
pub mod review_log;

pub use card::{Card, CardSchedulingData, CardState, CardStatus};
pub use preset::StudyPreset;
pub use rating::Rating;
pub use review_log::ReviewLog;
