//! Single-lane workflow.
//!
//! research → generate → quality gate → translation fan-out → package.
//! Phases run strictly in order; any fatal phase failure ends the lane with
//! a [`LaneError`] and never touches sibling lanes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{prompts, GenerationRequest, Generator, ImageCatalog, ModelSettings, Researcher};
use crate::core::isolation::{IsolationError, LaneIsolationManager};
use crate::core::journal::RunJournal;
use crate::core::json_extract::parse_embedded;
use crate::core::quality::{ArticleVerdict, QualityGate};
use crate::core::retry::{CallFailure, RetryableCaller};
use crate::core::translation::TranslationFanOut;
use crate::domain::{
    ArticlePackage, Artifact, Category, Event, EventType, LaneHandle, Language, SeoMetadata,
};

/// Terminal lane failures
#[derive(Debug, Error)]
pub enum LaneError {
    #[error("lane isolation failed: {0}")]
    Isolation(#[from] IsolationError),

    #[error("research failed: {0}")]
    Research(String),

    #[error("article generation failed: {0}")]
    Generation(#[source] CallFailure),

    #[error("article rejected with score {score}: {issues}")]
    Rejected { score: u8, issues: String },

    #[error("failed to write package: {0}")]
    Package(String),
}

/// Collaborators shared by every lane of a run
pub struct LaneServices {
    pub researcher: Arc<dyn Researcher>,
    pub generator: Arc<dyn Generator>,
    pub gate: Arc<QualityGate>,
    pub fan_out: Arc<TranslationFanOut>,
    pub isolation: Arc<LaneIsolationManager>,
    pub images: Arc<ImageCatalog>,
    pub journal: Arc<RunJournal>,
    pub models: ModelSettings,
    pub source_language: Language,
    pub languages: Vec<Language>,
    pub caller: RetryableCaller,
    pub date: String,
}

/// Runs one category through the pipeline
pub struct LaneWorkflow {
    services: Arc<LaneServices>,
}

impl LaneWorkflow {
    pub fn new(services: Arc<LaneServices>) -> Self {
        Self { services }
    }

    async fn phase(&self, lane: &str, phase: &str) {
        info!(%lane, %phase, "Lane phase");
        self.services
            .journal
            .record(Event::new(
                self.services.journal.run_id(),
                Some(lane.to_string()),
                EventType::LanePhase,
                phase,
            ))
            .await;
    }

    /// Run the lane inside its already-opened workspace
    #[instrument(skip(self, category, handle), fields(lane = %category.id, subject = %category.subject))]
    pub async fn run(&self, category: &Category, handle: &LaneHandle) -> Result<ArticlePackage, LaneError> {
        let svc = &self.services;
        let run_id = svc.journal.run_id();
        let lane = category.id.as_str();
        let started = Instant::now();

        // Research
        self.phase(lane, "research").await;
        let research = svc
            .caller
            .call(|_| svc.researcher.research(&category.id))
            .await
            .map_err(|e| LaneError::Research(e.to_string()))?;
        if !research.success {
            return Err(LaneError::Research("research returned no usable summary".to_string()));
        }

        // Primary article
        self.phase(lane, "generate").await;
        let request = GenerationRequest::new(
            prompts::article(&category.id, &category.subject, &research),
            &svc.models.article,
        )
        .with_max_tokens(3000);
        let output = svc
            .caller
            .generate(svc.generator.as_ref(), &request)
            .await
            .map_err(LaneError::Generation)?;
        let draft = Artifact::primary(&svc.source_language, output.content.trim().to_string());

        // Quality gate
        self.phase(lane, "validate").await;
        let (article, validation, improved) =
            match svc.gate.review_article(&draft, &category.id, &category.subject).await {
                ArticleVerdict::Accepted {
                    artifact,
                    validation,
                    improved,
                } => (artifact, validation, improved),
                ArticleVerdict::Rejected { validation } => {
                    svc.journal
                        .record(
                            Event::new(run_id, Some(lane.to_string()), EventType::ValidationScored, "article")
                                .with_validation(&validation),
                        )
                        .await;
                    return Err(LaneError::Rejected {
                        score: validation.score,
                        issues: validation.issues.join("; "),
                    });
                }
            };
        svc.journal
            .record(
                Event::new(
                    run_id,
                    Some(lane.to_string()),
                    EventType::ValidationScored,
                    if improved { "article (improved)" } else { "article" },
                )
                .with_validation(&validation),
            )
            .await;

        // Translations
        self.phase(lane, "translate").await;
        let fan_out = svc.fan_out.run(&article, &svc.languages, &category.id).await;

        let mut translations = BTreeMap::new();
        let mut translation_scores = BTreeMap::new();
        for (code, artifact, validation) in fan_out.translated() {
            svc.journal
                .record(
                    Event::new(run_id, Some(lane.to_string()), EventType::ValidationScored, code)
                        .with_validation(validation),
                )
                .await;
            translations.insert(code.to_string(), artifact.clone());
            translation_scores.insert(code.to_string(), validation.score);
        }

        let mut failed_languages = BTreeMap::new();
        for (code, reason) in fan_out.failed() {
            svc.journal
                .record(
                    Event::new(run_id, Some(lane.to_string()), EventType::LanguageFailed, code)
                        .with_error(reason),
                )
                .await;
            failed_languages.insert(code.to_string(), reason.to_string());
        }

        // Packaging
        self.phase(lane, "package").await;
        let seo = self.seo_metadata(&article, category).await;
        let image = svc
            .images
            .image_for(&category.subject, &category.id, &seo.image_alt, &svc.date);

        let package = ArticlePackage {
            category: category.id.clone(),
            subject: category.subject.clone(),
            primary: article,
            primary_score: validation.score,
            improved,
            translations,
            translation_scores,
            failed_languages,
            seo,
            image,
            generated_at: Utc::now(),
        };

        let path = self.write_package(&package, handle).await?;
        svc.isolation
            .commit(
                lane,
                &format!("{}: {} article for {}", category.id, category.subject, svc.date),
            )
            .await?;

        info!(
            path = %path.display(),
            languages = package.language_count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Lane packaged"
        );
        Ok(package)
    }

    /// SEO metadata from the generator, or the deterministic fallback
    async fn seo_metadata(&self, article: &Artifact, category: &Category) -> SeoMetadata {
        let svc = &self.services;
        let request = GenerationRequest::new(
            prompts::seo(&article.text, &category.id, &category.subject),
            &svc.models.seo,
        )
        .with_max_tokens(500);

        let parsed = match svc.caller.generate(svc.generator.as_ref(), &request).await {
            Ok(output) => parse_embedded::<SeoMetadata>(&output.content).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(seo) if !seo.title.trim().is_empty() => seo,
            Ok(_) => {
                warn!(lane = %category.id, "SEO metadata had no title, using fallback");
                SeoMetadata::fallback(&category.id, &category.subject)
            }
            Err(e) => {
                warn!(lane = %category.id, error = %e, "SEO metadata unavailable, using fallback");
                SeoMetadata::fallback(&category.id, &category.subject)
            }
        }
    }

    /// Write `{workspace}/articles/{date}/{category}.json`
    async fn write_package(&self, package: &ArticlePackage, handle: &LaneHandle) -> Result<PathBuf, LaneError> {
        let dir = handle.workspace.join("articles").join(&self.services.date);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LaneError::Package(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(format!("{}.json", package.category));
        let json = serde_json::to_string_pretty(package).map_err(|e| LaneError::Package(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LaneError::Package(format!("{}: {}", path.display(), e)))?;

        Ok(path)
    }
}

/// Journal helper used by the coordinator for lane-level events
pub(crate) fn lane_event(run_id: Uuid, lane: &str, event_type: EventType, summary: impl Into<String>) -> Event {
    Event::new(run_id, Some(lane.to_string()), event_type, summary)
}
