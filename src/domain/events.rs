//! Run journal events.
//!
//! Every phase transition of a run is recorded as an immutable event in an
//! append-only log, so a finished run can be inspected by replaying it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{Decision, ValidationResult};

/// A single event in the append-only run journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Lane (category) the event concerns, if any
    pub lane: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO secrets)
    pub summary: String,

    /// Quality score, for validation events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,

    /// Gate decision, for validation events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    /// Time taken in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        lane: Option<String>,
        event_type: EventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            lane,
            event_type,
            summary: summary.into(),
            score: None,
            decision: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Attach a validation outcome
    pub fn with_validation(mut self, result: &ValidationResult) -> Self {
        self.score = Some(result.score);
        self.decision = Some(result.decision);
        if let Some(ref caveat) = result.caveat {
            self.summary = format!("{} ({})", self.summary, caveat);
        }
        self
    }

    /// Create an event with duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events recorded during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunCompleted,

    /// Isolation workspace created for a lane
    LaneOpened,

    /// A lane entered a new phase (research, generate, validate, translate, package)
    LanePhase,

    /// The quality gate scored an artifact
    ValidationScored,

    /// A translation language failed terminally
    LanguageFailed,

    LaneCompleted,
    LaneFailed,

    MergeCompleted,
    MergeFailed,

    DeliverySucceeded,

    /// Delivery exhausted retries (or was skipped) and the bundle was persisted
    DeliveryDeferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("forex".to_string()),
            EventType::LanePhase,
            "research",
        );

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, EventType::LanePhase);
        assert_eq!(parsed.lane.as_deref(), Some("forex"));
        assert!(!json.contains("\"score\""));
    }

    #[test]
    fn test_event_with_validation_records_caveat() {
        let mut result = ValidationResult::local(70, Decision::Accept, "none");
        result.caveat = Some("scorer unavailable".to_string());

        let event = Event::new(Uuid::new_v4(), None, EventType::ValidationScored, "article")
            .with_validation(&result);

        assert_eq!(event.score, Some(70));
        assert_eq!(event.decision, Some(Decision::Accept));
        assert!(event.summary.contains("scorer unavailable"));
    }

    #[test]
    fn test_event_with_error() {
        let event = Event::new(Uuid::new_v4(), None, EventType::MergeFailed, "merge")
            .with_error("conflict in daily/crypto")
            .with_duration(15);

        assert_eq!(event.error.as_deref(), Some("conflict in daily/crypto"));
        assert_eq!(event.duration_ms, Some(15));
    }
}
