//! Micro-feedback events: streak/speed/accuracy/milestone/bonus-card pings
//! the enhanced session layer emits during a study run.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroFeedbackKind {
    Streak,
    Speed,
    Accuracy,
    Milestone,
    BonusCard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MicroFeedbackEvent {
    pub kind: MicroFeedbackKind,
    pub message: String,
    pub animation: String,
    pub sound: Option<String>,
}

/// A listener is never allowed to unwind the session: failures here are the
/// caller's problem, not ours, so the trait has no fallible path at all.
pub trait FeedbackSink: Send + Sync {
    fn notify(&self, event: MicroFeedbackEvent);
}

/// Default sink when an embedder wires nothing in.
pub struct NullFeedbackSink;

impl FeedbackSink for NullFeedbackSink {
    fn notify(&self, _event: MicroFeedbackEvent) {}
}

/// Buffers events for the caller to drain after each answered card.
pub struct QueueFeedbackSink {
    events: Mutex<Vec<MicroFeedbackEvent>>,
}

impl QueueFeedbackSink {
    pub fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    pub fn drain(&self) -> Vec<MicroFeedbackEvent> {
        match self.events.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }
}

impl Default for QueueFeedbackSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackSink for QueueFeedbackSink {
    fn notify(&self, event: MicroFeedbackEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_sink_drains_in_order() {
        let sink = QueueFeedbackSink::new();
        sink.notify(MicroFeedbackEvent {
            kind: MicroFeedbackKind::Streak,
            message: "5 in a row!".into(),
            animation: "streak".into(),
            sound: None,
        });
        sink.notify(MicroFeedbackEvent {
            kind: MicroFeedbackKind::BonusCard,
            message: "bonus!".into(),
            animation: "bonus".into(),
            sound: Some("coin".into()),
        });
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind, MicroFeedbackKind::Streak);
        assert!(sink.drain().is_empty());
    }
}
