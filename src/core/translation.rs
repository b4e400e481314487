//! Concurrent translation of an accepted article.
//!
//! One workflow per target language, all polled together and awaited to the
//! end: a failing language never cancels its siblings. Inside a workflow,
//! attempts are strictly sequential and each makes exactly one generation call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::adapters::{prompts, GenerationRequest, Generator};
use crate::core::quality::QualityGate;
use crate::core::retry::ErrorClass;
use crate::domain::{Artifact, Decision, Language, ValidationResult};

/// What happened on one attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,

    /// Upstream error, when generation itself failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One language's workflow and its attempt history
#[derive(Debug, Clone, Serialize)]
pub struct TranslationTask {
    pub language: Language,
    pub history: Vec<AttemptRecord>,
}

impl TranslationTask {
    fn new(language: Language) -> Self {
        Self {
            language,
            history: Vec::new(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.history.len() as u32
    }
}

/// Terminal result of one language
#[derive(Debug, Clone)]
pub enum TranslationOutcome {
    Translated {
        artifact: Artifact,
        validation: ValidationResult,
    },
    Failed {
        reason: String,
    },
}

impl TranslationOutcome {
    pub fn is_translated(&self) -> bool {
        matches!(self, TranslationOutcome::Translated { .. })
    }
}

/// Settled language workflow
#[derive(Debug, Clone)]
pub struct LanguageResult {
    pub task: TranslationTask,
    pub outcome: TranslationOutcome,
}

/// All languages, keyed by language code
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    pub languages: BTreeMap<String, LanguageResult>,
}

impl FanOutResult {
    /// Successful translations with their final validation
    pub fn translated(&self) -> impl Iterator<Item = (&str, &Artifact, &ValidationResult)> + '_ {
        self.languages.iter().filter_map(|(code, r)| match &r.outcome {
            TranslationOutcome::Translated { artifact, validation } => {
                Some((code.as_str(), artifact, validation))
            }
            TranslationOutcome::Failed { .. } => None,
        })
    }

    /// Failed languages with the reason
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.languages.iter().filter_map(|(code, r)| match &r.outcome {
            TranslationOutcome::Failed { reason } => Some((code.as_str(), reason.as_str())),
            TranslationOutcome::Translated { .. } => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.translated().count()
    }
}

/// Runs per-language translate → gate workflows concurrently
pub struct TranslationFanOut {
    translator: Arc<dyn Generator>,
    gate: Arc<QualityGate>,
    deployment: String,
}

impl TranslationFanOut {
    pub fn new(translator: Arc<dyn Generator>, gate: Arc<QualityGate>, deployment: impl Into<String>) -> Self {
        Self {
            translator,
            gate,
            deployment: deployment.into(),
        }
    }

    /// Translate `source` into every language and wait for all of them
    #[instrument(skip(self, source, languages), fields(languages = languages.len()))]
    pub async fn run(&self, source: &Artifact, languages: &[Language], category: &str) -> FanOutResult {
        let workflows = languages
            .iter()
            .map(|language| self.translate_one(source, language, category));

        let settled = futures::future::join_all(workflows).await;

        let mut result = FanOutResult::default();
        for language_result in settled {
            result
                .languages
                .insert(language_result.task.language.code.clone(), language_result);
        }

        info!(
            translated = result.success_count(),
            failed = result.languages.len() - result.success_count(),
            "Translations settled"
        );
        result
    }

    async fn translate_one(&self, source: &Artifact, language: &Language, category: &str) -> LanguageResult {
        let settings = self.gate.settings();
        let max_attempts = settings.max_translation_attempts.max(1);
        let mut task = TranslationTask::new(language.clone());
        let mut feedback: Vec<String> = Vec::new();
        let mut reason = String::from("no attempts made");

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = settings.translation_retry_delay_ms * (attempt - 1) as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            info!(language = %language.code, attempt, "Translating");

            let request = GenerationRequest::new(
                prompts::translation(&source.text, language, category, &feedback),
                &self.deployment,
            )
            .with_max_tokens(4000);

            let output = match self.translator.generate(&request).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(language = %language.code, attempt, error = %e, "Translation call failed");
                    task.history.push(AttemptRecord {
                        attempt,
                        score: None,
                        decision: None,
                        issues: Vec::new(),
                        error: Some(e.to_string()),
                    });
                    reason = e.to_string();
                    if e.class() == ErrorClass::Fatal {
                        break;
                    }
                    continue;
                }
            };

            let artifact = Artifact::translation(source, language, output.content.trim().to_string());
            let validation = self
                .gate
                .score_translation(source, &artifact, language, category)
                .await;

            task.history.push(AttemptRecord {
                attempt,
                score: Some(validation.score),
                decision: Some(validation.decision),
                issues: validation.issues.clone(),
                error: None,
            });

            if validation.decision.is_accept() {
                return LanguageResult {
                    task,
                    outcome: TranslationOutcome::Translated { artifact, validation },
                };
            }

            warn!(
                language = %language.code,
                attempt,
                score = validation.score,
                decision = %validation.decision,
                "Translation not accepted"
            );
            reason = format!(
                "score {} ({}) after attempt {}: {}",
                validation.score,
                validation.decision,
                attempt,
                validation.issues.join("; ")
            );
            feedback = validation.feedback();
        }

        warn!(language = %language.code, attempts = task.attempts(), %reason, "Translation abandoned");
        LanguageResult {
            task,
            outcome: TranslationOutcome::Failed { reason },
        }
    }
}
