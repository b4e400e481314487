//! Quality gate for generated articles and translations.
//!
//! Scores come from an external scorer; this module decides what to do with
//! them:
//! - Articles: ACCEPT, one IMPROVE pass, or REJECT (lane aborts)
//! - Translations: cheap local checks first, then the scorer, then penalties
//! - Scorer outages fall back to a passing score with a recorded caveat

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::adapters::{prompts, GenerationRequest, Generator, ModelSettings};
use crate::core::json_extract::parse_embedded;
use crate::core::retry::{RetryPolicy, RetryableCaller};
use crate::domain::{Artifact, Decision, Language, Stage, ValidationResult};

/// Markers that betray an unfinished translation
const PLACEHOLDER_MARKERS: &[&str] = &["[INSERT", "[TODO", "{{", "}}"];

/// Thresholds and penalties applied by the gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Minimum score to publish
    #[serde(default = "default_publish_threshold")]
    pub publish_threshold: u8,

    /// Minimum score for an improvement pass (articles) or another attempt (translations)
    #[serde(default = "default_improve_threshold")]
    pub improve_threshold: u8,

    /// Generation calls allowed per translation language
    #[serde(default = "default_max_translation_attempts")]
    pub max_translation_attempts: u32,

    /// Translations shorter than this share of the source are rejected outright
    #[serde(default = "default_hard_length_ratio")]
    pub hard_length_ratio: f64,

    #[serde(default = "default_soft_length_min")]
    pub soft_length_min: f64,

    #[serde(default = "default_soft_length_max")]
    pub soft_length_max: f64,

    #[serde(default = "default_length_penalty")]
    pub length_penalty: u8,

    #[serde(default = "default_placeholder_penalty")]
    pub placeholder_penalty: u8,

    /// Penalty when the target script is absent from the output
    #[serde(default = "default_script_penalty")]
    pub script_penalty: u8,

    /// Score assumed when the scorer is unavailable
    #[serde(default = "default_fallback_score")]
    pub fallback_score: u8,

    /// Treat an unavailable scorer as a pass (with caveat) instead of a reject
    #[serde(default = "default_true")]
    pub pass_on_scorer_error: bool,

    /// Score the improved article again before accepting it
    #[serde(default)]
    pub rescore_improved: bool,

    /// Base wait between translation attempts in milliseconds (linear)
    #[serde(default = "default_translation_retry_delay")]
    pub translation_retry_delay_ms: u64,
}

fn default_publish_threshold() -> u8 {
    70
}
fn default_improve_threshold() -> u8 {
    50
}
fn default_max_translation_attempts() -> u32 {
    3
}
fn default_hard_length_ratio() -> f64 {
    0.5
}
fn default_soft_length_min() -> f64 {
    0.7
}
fn default_soft_length_max() -> f64 {
    1.3
}
fn default_length_penalty() -> u8 {
    20
}
fn default_placeholder_penalty() -> u8 {
    30
}
fn default_script_penalty() -> u8 {
    50
}
fn default_fallback_score() -> u8 {
    70
}
fn default_true() -> bool {
    true
}
fn default_translation_retry_delay() -> u64 {
    2000
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            publish_threshold: default_publish_threshold(),
            improve_threshold: default_improve_threshold(),
            max_translation_attempts: default_max_translation_attempts(),
            hard_length_ratio: default_hard_length_ratio(),
            soft_length_min: default_soft_length_min(),
            soft_length_max: default_soft_length_max(),
            length_penalty: default_length_penalty(),
            placeholder_penalty: default_placeholder_penalty(),
            script_penalty: default_script_penalty(),
            fallback_score: default_fallback_score(),
            pass_on_scorer_error: true,
            rescore_improved: false,
            translation_retry_delay_ms: default_translation_retry_delay(),
        }
    }
}

impl QualitySettings {
    pub fn decide(&self, score: u8, stage: Stage) -> Decision {
        Decision::from_score(score, self.publish_threshold, self.improve_threshold, stage)
    }
}

/// Structured payload expected from the scorer
#[derive(Debug, Deserialize)]
struct ScorePayload {
    quality_score: f64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements_needed: Vec<String>,
}

/// Outcome of the article gate
#[derive(Debug, Clone)]
pub enum ArticleVerdict {
    /// Publishable article: the original, or the one improvement pass
    Accepted {
        artifact: Artifact,
        validation: ValidationResult,
        improved: bool,
    },

    /// Below the floor; the lane stops here
    Rejected { validation: ValidationResult },
}

/// Scores artifacts and drives the improvement pass
pub struct QualityGate {
    scorer: Arc<dyn Generator>,
    improver: Arc<dyn Generator>,
    models: ModelSettings,
    settings: QualitySettings,
    caller: RetryableCaller,
}

impl QualityGate {
    pub fn new(
        scorer: Arc<dyn Generator>,
        improver: Arc<dyn Generator>,
        models: ModelSettings,
        settings: QualitySettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            scorer,
            improver,
            models,
            settings,
            caller: RetryableCaller::new("scorer", retry),
        }
    }

    pub fn settings(&self) -> &QualitySettings {
        &self.settings
    }

    /// Ask the scorer, returning the parsed payload or a caveat explaining why not
    async fn ask_scorer(&self, request: GenerationRequest) -> Result<ScorePayload, String> {
        let output = self
            .caller
            .generate(self.scorer.as_ref(), &request)
            .await
            .map_err(|e| format!("scorer unavailable: {}", e))?;

        parse_embedded::<ScorePayload>(&output.content)
            .map_err(|e| format!("scorer response unusable: {}", e))
    }

    /// Fallback result when the scorer cannot be used
    fn fallback(&self, caveat: String) -> ValidationResult {
        let (score, decision) = if self.settings.pass_on_scorer_error {
            (
                self.settings.fallback_score.max(self.settings.publish_threshold),
                Decision::Accept,
            )
        } else {
            (0, Decision::Reject)
        };

        warn!(%caveat, score, %decision, "Falling back on default quality score");

        ValidationResult {
            score,
            decision,
            issues: Vec::new(),
            strengths: Vec::new(),
            improvements: Vec::new(),
            caveat: Some(caveat),
        }
    }

    /// Score a primary (or improved) article
    #[instrument(skip(self, article), fields(words = article.word_count))]
    pub async fn score_article(&self, article: &Artifact, category: &str, subject: &str) -> ValidationResult {
        let request = GenerationRequest::new(
            prompts::article_scoring(&article.text, category, subject),
            &self.models.scoring,
        )
        .with_max_tokens(3000)
        .with_temperature(0.3);

        let payload = match self.ask_scorer(request).await {
            Ok(payload) => payload,
            Err(caveat) => return self.fallback(caveat),
        };

        let score = clamp_score(payload.quality_score);
        let decision = self.settings.decide(score, Stage::Article);
        info!(score, %decision, "Article scored");

        ValidationResult {
            score,
            decision,
            issues: payload.issues,
            strengths: payload.strengths,
            improvements: payload.improvements_needed,
            caveat: None,
        }
    }

    /// One improvement pass. `None` when the improver fails or returns nothing.
    pub async fn improve(
        &self,
        article: &Artifact,
        validation: &ValidationResult,
        category: &str,
        subject: &str,
    ) -> Option<Artifact> {
        let request = GenerationRequest::new(
            prompts::improvement(&article.text, category, subject, &validation.feedback()),
            &self.models.improvement,
        )
        .with_max_tokens(8000);

        match self.improver.generate(&request).await {
            Ok(output) if !output.content.trim().is_empty() => {
                let improved = article.supersede(output.content.trim().to_string());
                info!(words = improved.word_count, "Article improved");
                Some(improved)
            }
            Ok(_) => {
                warn!("Improver returned empty text, keeping original");
                None
            }
            Err(e) => {
                warn!(error = %e, "Improvement failed, keeping original");
                None
            }
        }
    }

    /// Full article gate: score, then accept, improve once, or reject
    pub async fn review_article(&self, article: &Artifact, category: &str, subject: &str) -> ArticleVerdict {
        let validation = self.score_article(article, category, subject).await;

        match validation.decision {
            Decision::Accept => ArticleVerdict::Accepted {
                artifact: article.clone(),
                validation,
                improved: false,
            },
            Decision::Reject => ArticleVerdict::Rejected { validation },
            Decision::Improve | Decision::Retry => {
                let Some(improved) = self.improve(article, &validation, category, subject).await else {
                    let mut validation = validation;
                    validation.caveat = Some("improvement unavailable; original article kept".to_string());
                    return ArticleVerdict::Accepted {
                        artifact: article.clone(),
                        validation,
                        improved: false,
                    };
                };

                if !self.settings.rescore_improved {
                    return ArticleVerdict::Accepted {
                        artifact: improved,
                        validation,
                        improved: true,
                    };
                }

                let rescored = self.score_article(&improved, category, subject).await;
                if rescored.decision == Decision::Reject {
                    ArticleVerdict::Rejected { validation: rescored }
                } else {
                    ArticleVerdict::Accepted {
                        artifact: improved,
                        validation: rescored,
                        improved: true,
                    }
                }
            }
        }
    }

    /// Score a translation: local checks, scorer, then penalties
    #[instrument(skip(self, source, translated, language), fields(language = %language.code))]
    pub async fn score_translation(
        &self,
        source: &Artifact,
        translated: &Artifact,
        language: &Language,
        category: &str,
    ) -> ValidationResult {
        let s = &self.settings;

        if translated.text.trim().is_empty() {
            return ValidationResult::local(0, Decision::Reject, "Translation is empty");
        }

        let w = translated.word_count as f64;
        let src = source.word_count.max(1) as f64;
        if w < s.hard_length_ratio * src {
            return ValidationResult::local(
                30,
                Decision::Reject,
                format!(
                    "Translation too short: {} words vs {} words in original",
                    translated.word_count, source.word_count
                ),
            );
        }

        let mut penalties: Vec<(u8, String)> = Vec::new();

        let ratio = w / src;
        if ratio < s.soft_length_min || ratio > s.soft_length_max {
            penalties.push((s.length_penalty, format!("Length mismatch: ratio {:.2}", ratio)));
        }

        for marker in PLACEHOLDER_MARKERS {
            if translated.text.contains(marker) {
                penalties.push((s.placeholder_penalty, format!("Contains placeholder '{}'", marker)));
            }
        }

        let script_missing = !language.script.is_present_in(&translated.text);
        if script_missing {
            penalties.push((
                s.script_penalty,
                format!("No {:?} script characters in {} output", language.script, language.name),
            ));
        }

        let request = GenerationRequest::new(
            prompts::translation_scoring(&source.text, &translated.text, language, category),
            &self.models.translation_scoring,
        )
        .with_max_tokens(500)
        .with_temperature(0.3);

        let mut result = match self.ask_scorer(request).await {
            Ok(payload) => ValidationResult {
                score: clamp_score(payload.quality_score),
                decision: Decision::Accept,
                issues: payload.issues,
                strengths: payload.strengths,
                improvements: payload.improvements_needed,
                caveat: None,
            },
            Err(caveat) => self.fallback(caveat),
        };

        let total: i32 = penalties.iter().map(|(p, _)| *p as i32).sum();
        result.score = (result.score as i32 - total).clamp(0, 100) as u8;
        // Wrong-script output never reaches the retry band
        if script_missing {
            result.score = result.score.min(s.improve_threshold.saturating_sub(1));
        }
        result.issues.extend(penalties.into_iter().map(|(_, issue)| issue));

        result.decision = s.decide(result.score, Stage::Translation);

        info!(score = result.score, decision = %result.decision, "Translation scored");
        result
    }
}

fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
