//! Single-owner study session: queue management, answer processing, and the
//! enhanced gamified layer built on top of it.

pub mod enhanced;
pub mod feedback;
pub mod study_session;

pub use enhanced::EnhancedStudySession;
pub use feedback::{FeedbackSink, MicroFeedbackEvent, MicroFeedbackKind, NullFeedbackSink, QueueFeedbackSink};
pub use study_session::{ReviewHistoryEntry, SessionProgress, SessionSummary, StudySession};
