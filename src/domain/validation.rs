//! Validation results produced by the quality gate.
//!
//! A result is consumed immediately to pick the next transition. It is never
//! stored on its own; the run journal keeps score and decision for inspection.

use serde::{Deserialize, Serialize};

/// Which gate produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Article,
    Translation,
}

/// Gate decision for one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Publishable as is
    Accept,

    /// Article path: one improvement pass
    Improve,

    /// Translation path: generate again
    Retry,

    /// Below the floor
    Reject,
}

impl Decision {
    /// Map a score to a decision. Pure function of score, thresholds and stage.
    ///
    /// `score >= publish` accepts, `improve <= score < publish` improves (articles)
    /// or retries (translations), anything lower rejects.
    pub fn from_score(score: u8, publish: u8, improve: u8, stage: Stage) -> Self {
        if score >= publish {
            Decision::Accept
        } else if score >= improve {
            match stage {
                Stage::Article => Decision::Improve,
                Stage::Translation => Decision::Retry,
            }
        } else {
            Decision::Reject
        }
    }

    pub fn is_accept(self) -> bool {
        matches!(self, Decision::Accept)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Accept => "ACCEPT",
            Decision::Improve => "IMPROVE",
            Decision::Retry => "RETRY",
            Decision::Reject => "REJECT",
        };
        f.write_str(s)
    }
}

/// Outcome of scoring one artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Score in 0..=100
    pub score: u8,

    /// Decision derived from the score and local checks
    pub decision: Decision,

    /// Problems found
    #[serde(default)]
    pub issues: Vec<String>,

    /// What the scorer liked
    #[serde(default)]
    pub strengths: Vec<String>,

    /// Concrete changes requested by the scorer
    #[serde(default)]
    pub improvements: Vec<String>,

    /// Set when the score is a fallback rather than a real assessment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveat: Option<String>,
}

impl ValidationResult {
    /// Result produced by a local check, without consulting the scorer
    pub fn local(score: u8, decision: Decision, issue: impl Into<String>) -> Self {
        Self {
            score,
            decision,
            issues: vec![issue.into()],
            strengths: Vec::new(),
            improvements: Vec::new(),
            caveat: None,
        }
    }

    /// Whether the score was assumed rather than assessed
    pub fn is_fallback(&self) -> bool {
        self.caveat.is_some()
    }

    /// Issues and requested improvements, for the improvement prompt
    pub fn feedback(&self) -> Vec<String> {
        if self.improvements.is_empty() {
            self.issues.clone()
        } else {
            self.improvements.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_decision_bands() {
        assert_eq!(Decision::from_score(100, 70, 50, Stage::Article), Decision::Accept);
        assert_eq!(Decision::from_score(70, 70, 50, Stage::Article), Decision::Accept);
        assert_eq!(Decision::from_score(69, 70, 50, Stage::Article), Decision::Improve);
        assert_eq!(Decision::from_score(50, 70, 50, Stage::Article), Decision::Improve);
        assert_eq!(Decision::from_score(49, 70, 50, Stage::Article), Decision::Reject);
        assert_eq!(Decision::from_score(0, 70, 50, Stage::Article), Decision::Reject);
    }

    #[test]
    fn test_translation_uses_retry_band() {
        assert_eq!(Decision::from_score(60, 70, 50, Stage::Translation), Decision::Retry);
        assert_eq!(Decision::from_score(85, 70, 50, Stage::Translation), Decision::Accept);
        assert_eq!(Decision::from_score(20, 70, 50, Stage::Translation), Decision::Reject);
    }

    #[test]
    fn test_decision_serializes_uppercase() {
        let json = serde_json::to_string(&Decision::Improve).unwrap();
        assert_eq!(json, "\"IMPROVE\"");
    }

    #[test]
    fn test_feedback_prefers_improvements() {
        let mut result = ValidationResult::local(60, Decision::Improve, "thin analysis");
        assert_eq!(result.feedback(), vec!["thin analysis".to_string()]);

        result.improvements.push("add support levels".to_string());
        assert_eq!(result.feedback(), vec!["add support levels".to_string()]);
    }
}
