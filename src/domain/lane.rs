//! Lane state.
//!
//! A lane is one topic category moving through the full pipeline inside its
//! own isolated workspace.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured topic category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Identifier, also the lane id (e.g. "forex")
    pub id: String,

    /// Subject of today's article (e.g. "EUR/USD")
    pub subject: String,
}

impl Category {
    pub fn new(id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
        }
    }

    /// Default lineup: one forex pair, one coin, one commodity
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("forex", "EUR/USD"),
            Self::new("crypto", "Bitcoin"),
            Self::new("commodities", "Gold"),
        ]
    }
}

/// One category being processed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    /// Category identifier (e.g. "forex")
    pub id: String,

    /// Subject the article is about (e.g. "EUR/USD")
    pub subject: String,

    /// Isolated workspace, once opened
    pub handle: Option<LaneHandle>,

    /// Lifecycle state
    pub state: LaneState,

    /// When the lane started running
    pub started_at: Option<DateTime<Utc>>,

    /// When the lane reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl Lane {
    /// Create a pending lane for a category
    pub fn for_category(category: &Category) -> Self {
        Self::new(category.id.clone(), category.subject.clone())
    }

    /// Create a pending lane
    pub fn new(id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            handle: None,
            state: LaneState::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    /// PENDING -> RUNNING
    pub fn start(&mut self, handle: LaneHandle) {
        self.handle = Some(handle);
        self.state = LaneState::Running;
        self.started_at = Some(Utc::now());
    }

    /// RUNNING -> COMPLETED
    pub fn complete(&mut self) {
        self.state = LaneState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Any state -> FAILED
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = LaneState::Failed {
            error: error.into(),
        };
        self.finished_at = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, LaneState::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, LaneState::Failed { .. })
    }
}

/// Branch and working copy owned by one lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneHandle {
    /// Lane branch name (e.g. "daily/forex-2025-10-20")
    pub branch: String,

    /// Working copy directory
    pub workspace: PathBuf,
}

/// Lifecycle of a lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum LaneState {
    Pending,
    Running,
    Completed,
    Failed { error: String },
}

impl Default for LaneState {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_lifecycle() {
        let mut lane = Lane::new("forex", "EUR/USD");
        assert_eq!(lane.state, LaneState::Pending);

        lane.start(LaneHandle {
            branch: "daily/forex-2025-10-20".to_string(),
            workspace: PathBuf::from("/tmp/blog-forex"),
        });
        assert_eq!(lane.state, LaneState::Running);
        assert!(lane.started_at.is_some());

        lane.complete();
        assert!(lane.is_completed());
        assert!(lane.finished_at.is_some());
    }

    #[test]
    fn test_lane_failure_keeps_handle() {
        let mut lane = Lane::new("crypto", "Bitcoin");
        lane.start(LaneHandle {
            branch: "daily/crypto-2025-10-20".to_string(),
            workspace: PathBuf::from("/tmp/blog-crypto"),
        });
        lane.fail("article rejected");

        assert!(lane.is_failed());
        assert!(lane.handle.is_some());
    }
}
