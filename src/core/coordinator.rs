//! Run coordinator.
//!
//! Sequences one run:
//! 1. Open one lane per category (sequential, category order)
//! 2. Run lane workflows concurrently until all settle
//! 3. Merge completed lanes into the baseline (all or nothing)
//! 4. Keep only complete packages, deliver them (or persist on failure)
//! 5. Clean up lane isolation regardless of the outcome
//!
//! Lane failures are converted to values at the lane boundary; nothing
//! escapes `run` except the report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    AzureOpenAiClient, DeliverySink, Generator, GitCli, ImageCatalog, ModelSettings,
    PerplexityClient, Researcher, VcsBackend, WebhookSink,
};
use crate::config::ResolvedConfig;
use crate::core::delivery::{DeliveryClient, DeliveryOutcome};
use crate::core::isolation::{CleanupReport, IsolationSettings, LaneIsolationManager};
use crate::core::journal::RunJournal;
use crate::core::lane::{lane_event, LaneServices, LaneWorkflow};
use crate::core::quality::{QualityGate, QualitySettings};
use crate::core::retry::{RetryPolicy, RetryableCaller};
use crate::core::translation::TranslationFanOut;
use crate::domain::{
    ArticlePackage, BundleMetadata, Category, DeliveryBundle, Event, EventType, Lane, LaneHandle,
    LaneState, Language,
};

/// Everything the engine needs besides collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub categories: Vec<Category>,

    /// Language articles are written in
    pub source_language: Language,

    /// Translation targets
    pub languages: Vec<Language>,

    pub quality: QualitySettings,
    pub models: ModelSettings,
    pub generation_retry: RetryPolicy,
    pub delivery_retry: RetryPolicy,
    pub isolation: IsolationSettings,

    /// Run journals live here
    pub runs_dir: PathBuf,

    /// Durable failure store for undelivered bundles
    pub failed_dir: PathBuf,
}

/// External collaborators of a run
#[derive(Clone)]
pub struct Collaborators {
    pub researcher: Arc<dyn Researcher>,
    pub generator: Arc<dyn Generator>,
    pub translator: Arc<dyn Generator>,
    pub scorer: Arc<dyn Generator>,
    pub improver: Arc<dyn Generator>,
    pub sink: Arc<dyn DeliverySink>,
    pub vcs: Arc<dyn VcsBackend>,
    pub images: Arc<ImageCatalog>,
}

/// Merge step outcome
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeStatus {
    Merged { lanes: Vec<String> },
    Failed { error: String },
    /// No completed lanes
    Skipped,
}

/// What a run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: String,
    pub lanes: Vec<Lane>,

    /// Packages that went into the bundle
    pub delivered_packages: Vec<String>,

    /// Complete lanes left out of the bundle, with their missing languages
    pub excluded_packages: Vec<(String, Vec<String>)>,

    pub merge: MergeStatus,
    pub delivery: DeliveryOutcome,
    pub cleanup: CleanupReport,
    pub elapsed_seconds: u64,
}

impl RunReport {
    pub fn completed_lanes(&self) -> usize {
        self.lanes.iter().filter(|l| l.is_completed()).count()
    }

    pub fn failed_lanes(&self) -> usize {
        self.lanes.iter().filter(|l| l.is_failed()).count()
    }

    /// At least one lane made it and the merge held
    pub fn is_success(&self) -> bool {
        self.completed_lanes() > 0 && !matches!(self.merge, MergeStatus::Failed { .. })
    }
}

/// Top-level pipeline state machine
pub struct PipelineCoordinator {
    collaborators: Collaborators,
    settings: PipelineSettings,
}

impl PipelineCoordinator {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Wire the HTTP and git adapters from resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let svc = &config.services;

        let azure: Arc<dyn Generator> = Arc::new(AzureOpenAiClient::new(
            svc.azure_endpoint.clone(),
            svc.azure_key.clone(),
            svc.azure_api_version.clone(),
            svc.request_timeout,
        ));

        let collaborators = Collaborators {
            researcher: Arc::new(PerplexityClient::new(
                svc.perplexity_endpoint.clone(),
                svc.perplexity_key.clone(),
                svc.perplexity_model.clone(),
                svc.request_timeout,
            )),
            generator: azure.clone(),
            translator: azure.clone(),
            scorer: azure.clone(),
            improver: azure,
            sink: Arc::new(WebhookSink::new(svc.webhook_url.clone(), svc.delivery_timeout)),
            vcs: Arc::new(GitCli::new(config.pipeline.isolation.repo.clone())),
            images: Arc::new(ImageCatalog::new(
                svc.images_base_url.clone(),
                config.images_dir.clone(),
            )),
        };

        Ok(Self::new(collaborators, config.pipeline.clone()))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn delivery_client(&self) -> DeliveryClient {
        DeliveryClient::new(
            self.collaborators.sink.clone(),
            self.settings.delivery_retry.clone(),
            self.settings.failed_dir.clone(),
        )
    }

    /// Categories selected for this run, in configured order
    fn selected(&self, only: &[String]) -> Vec<Category> {
        self.settings
            .categories
            .iter()
            .filter(|c| only.is_empty() || only.contains(&c.id))
            .cloned()
            .collect()
    }

    /// Execute one run. `only` restricts the run to some category ids.
    #[instrument(skip(self, only))]
    pub async fn run(&self, only: &[String]) -> RunReport {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let categories = self.selected(only);

        info!(%run_id, %date, lanes = categories.len(), "Starting run");

        let journal = match RunJournal::open(&self.settings.runs_dir, run_id).await {
            Ok(journal) => journal,
            Err(e) => {
                warn!(error = %e, "Run journal unavailable; continuing without it");
                RunJournal::at(&self.settings.runs_dir, run_id)
            }
        };
        let journal = Arc::new(journal);
        journal
            .record(Event::new(
                run_id,
                None,
                EventType::RunStarted,
                format!("{} lane(s) for {}", categories.len(), date),
            ))
            .await;

        let c = &self.collaborators;
        let isolation = Arc::new(LaneIsolationManager::new(
            c.vcs.clone(),
            self.settings.isolation.clone(),
            date.clone(),
        ));
        let gate = Arc::new(QualityGate::new(
            c.scorer.clone(),
            c.improver.clone(),
            self.settings.models.clone(),
            self.settings.quality.clone(),
            self.settings.generation_retry.clone(),
        ));
        let fan_out = Arc::new(TranslationFanOut::new(
            c.translator.clone(),
            gate.clone(),
            self.settings.models.translation.clone(),
        ));
        let workflow = LaneWorkflow::new(Arc::new(LaneServices {
            researcher: c.researcher.clone(),
            generator: c.generator.clone(),
            gate,
            fan_out,
            isolation: isolation.clone(),
            images: c.images.clone(),
            journal: journal.clone(),
            models: self.settings.models.clone(),
            source_language: self.settings.source_language.clone(),
            languages: self.settings.languages.clone(),
            caller: RetryableCaller::new("generation", self.settings.generation_retry.clone()),
            date: date.clone(),
        }));

        // 1. Open lanes one at a time so registration order is category order
        let mut lanes: Vec<Lane> = categories.iter().map(Lane::for_category).collect();
        for lane in lanes.iter_mut() {
            match isolation.open(&lane.id).await {
                Ok(handle) => {
                    journal
                        .record(lane_event(run_id, &lane.id, EventType::LaneOpened, handle.branch.clone()))
                        .await;
                    lane.start(handle);
                }
                Err(e) => {
                    error!(lane = %lane.id, error = %e, "Lane could not be opened");
                    journal
                        .record(
                            lane_event(run_id, &lane.id, EventType::LaneFailed, "isolation").with_error(e.to_string()),
                        )
                        .await;
                    lane.fail(e.to_string());
                }
            }
        }

        // 2. Run every opened lane to completion
        let running: Vec<(usize, LaneHandle)> = lanes
            .iter()
            .enumerate()
            .filter(|(_, lane)| lane.state == LaneState::Running)
            .filter_map(|(idx, lane)| lane.handle.clone().map(|handle| (idx, handle)))
            .collect();

        let workflows = running.iter().map(|(idx, handle)| {
            let category = &categories[*idx];
            let workflow = &workflow;
            async move {
                let started = Instant::now();
                let result = workflow.run(category, handle).await;
                (started.elapsed().as_millis() as u64, result)
            }
        });
        let settled = futures::future::join_all(workflows).await;

        let mut packages: Vec<ArticlePackage> = Vec::new();
        for ((idx, _), (duration_ms, result)) in running.iter().zip(settled) {
            let lane = &mut lanes[*idx];
            match result {
                Ok(package) => {
                    journal
                        .record(
                            lane_event(
                                run_id,
                                &lane.id,
                                EventType::LaneCompleted,
                                format!("{} language(s)", package.language_count()),
                            )
                            .with_duration(duration_ms),
                        )
                        .await;
                    lane.complete();
                    packages.push(package);
                }
                Err(e) => {
                    error!(lane = %lane.id, error = %e, "Lane failed");
                    journal
                        .record(
                            lane_event(run_id, &lane.id, EventType::LaneFailed, "workflow")
                                .with_error(e.to_string())
                                .with_duration(duration_ms),
                        )
                        .await;
                    lane.fail(e.to_string());
                }
            }
        }

        // 3. Merge completed lanes
        let completed: Vec<String> = lanes
            .iter()
            .filter(|l| l.is_completed())
            .map(|l| l.id.clone())
            .collect();

        let merge = if completed.is_empty() {
            MergeStatus::Skipped
        } else {
            match isolation.merge_all(&completed).await {
                Ok(report) => {
                    journal
                        .record(Event::new(
                            run_id,
                            None,
                            EventType::MergeCompleted,
                            report.merged.join(", "),
                        ))
                        .await;
                    MergeStatus::Merged { lanes: report.merged }
                }
                Err(e) => {
                    error!(error = %e, "Merge step failed");
                    journal
                        .record(Event::new(run_id, None, EventType::MergeFailed, "merge").with_error(e.to_string()))
                        .await;
                    MergeStatus::Failed { error: e.to_string() }
                }
            }
        };

        // 4. Only complete packages are delivered
        let (deliverable, incomplete): (Vec<ArticlePackage>, Vec<ArticlePackage>) = packages
            .into_iter()
            .partition(|p| p.is_complete(&self.settings.languages));

        let excluded_packages: Vec<(String, Vec<String>)> = incomplete
            .iter()
            .map(|p| (p.category.clone(), p.missing_languages(&self.settings.languages)))
            .collect();
        for (category, missing) in &excluded_packages {
            warn!(lane = %category, missing = ?missing, "Package incomplete, excluded from delivery");
        }

        let lanes_failed = lanes.iter().filter(|l| l.is_failed()).count();
        let metadata = BundleMetadata::summarize(
            &deliverable,
            &date,
            started.elapsed().as_secs(),
            1 + self.settings.languages.len(),
            lanes_failed,
        );
        let bundle = DeliveryBundle::assemble(Utc::now(), &deliverable, metadata);

        // 5. Deliver, or persist when delivery is off the table
        let delivery_client = self.delivery_client();
        let delivery = match &merge {
            MergeStatus::Failed { error } if !bundle.is_empty() => {
                delivery_client
                    .skip(&bundle, &date, &format!("merge failed: {}", error))
                    .await
            }
            _ if bundle.is_empty() => DeliveryOutcome::Skipped {
                reason: "no complete packages".to_string(),
                persisted: None,
            },
            _ => delivery_client.deliver_with_retry(&bundle, &date).await,
        };

        let delivery_event = match &delivery {
            DeliveryOutcome::Delivered { status, .. } => {
                Event::new(run_id, None, EventType::DeliverySucceeded, format!("delivered (HTTP {})", status))
            }
            DeliveryOutcome::Deferred { path, error, .. } => Event::new(
                run_id,
                None,
                EventType::DeliveryDeferred,
                format!("deferred to {}", path.display()),
            )
            .with_error(error.clone()),
            DeliveryOutcome::Skipped { reason, persisted } => Event::new(
                run_id,
                None,
                EventType::DeliveryDeferred,
                match persisted {
                    Some(path) => format!("skipped ({}), persisted to {}", reason, path.display()),
                    None => format!("skipped ({})", reason),
                },
            ),
            DeliveryOutcome::Unpersisted { error, persist_error } => {
                Event::new(run_id, None, EventType::DeliveryDeferred, "delivery failed, bundle not persisted")
                    .with_error(format!("{}; {}", error, persist_error))
            }
        };
        journal.record(delivery_event).await;

        // 6. Cleanup for every lane that got a workspace
        let opened: Vec<String> = lanes
            .iter()
            .filter(|l| l.handle.is_some())
            .map(|l| l.id.clone())
            .collect();
        let cleanup = isolation.cleanup(&opened).await;
        for warning in &cleanup.warnings {
            warn!(%warning, "Cleanup incomplete");
        }

        let report = RunReport {
            run_id,
            date,
            delivered_packages: deliverable.iter().map(|p| p.category.clone()).collect(),
            excluded_packages,
            lanes,
            merge,
            delivery,
            cleanup,
            elapsed_seconds: started.elapsed().as_secs(),
        };

        journal
            .record(
                Event::new(
                    run_id,
                    None,
                    EventType::RunCompleted,
                    format!(
                        "{} completed, {} failed",
                        report.completed_lanes(),
                        report.failed_lanes()
                    ),
                )
                .with_duration(started.elapsed().as_millis() as u64),
            )
            .await;

        info!(
            %run_id,
            completed = report.completed_lanes(),
            failed = report.failed_lanes(),
            delivered = report.delivery.is_delivered(),
            "Run finished"
        );
        report
    }
}
