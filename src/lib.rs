//! Spaced-repetition scheduling core: FSRS-5 and SM-2 algorithms, study
//! session management, and offline review analytics.
//!
//! The crate is storage- and UI-agnostic: callers provide a `CardStore`,
//! a `Clock`, and an `Rng`, and everything above that is pure or deterministic
//! given those three seams.

pub mod analytics;
pub mod clock;
pub mod config;
pub mod display_order;
pub mod domain;
pub mod easy_days;
pub mod error;
pub mod gamification;
pub mod model;
pub mod rng;
pub mod scheduler;
pub mod session;
pub mod state_machine;
pub mod store;

pub use clock::{Clock, FrozenClock, SystemClock};
pub use config::{Algorithm, CoreConfig, EasyDaysConfig, SchedulerConfig, SessionConfig};
pub use domain::{Card, CardSchedulingData, CardState, CardStatus, Rating, ReviewLog, StudyPreset};
pub use error::{CoreError, CoreResult};
pub use rng::{Rng as CoreRng, SeededRng};
pub use scheduler::{ProcessAnswerResult, ScheduledCard, Scheduler, StudyStats};
pub use session::{EnhancedStudySession, FeedbackSink, StudySession};
pub use store::CardStore;
