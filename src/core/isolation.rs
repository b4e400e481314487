//! Per-lane version-control isolation.
//!
//! Each lane gets its own branch and working copy. The lane registry is owned
//! by one manager instance and only touched under its lock; a workspace is
//! used by exactly one lane workflow until merge.
//!
//! Merging goes through a temporary integration branch so the baseline only
//! moves when every lane merged cleanly.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::adapters::{VcsBackend, VcsError};
use crate::domain::LaneHandle;

/// Where lanes live and what they branch from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationSettings {
    /// Main repository; the baseline is checked out here
    pub repo: PathBuf,

    /// Directory holding lane working copies
    pub workspace_root: PathBuf,

    /// Shared branch lanes start from and merge into
    #[serde(default = "default_baseline")]
    pub baseline: String,

    /// Prefix for lane branches
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_baseline() -> String {
    "main".to_string()
}
fn default_branch_prefix() -> String {
    "daily".to_string()
}

/// Lane isolation failures
#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("lane '{0}' is already open")]
    AlreadyOpen(String),

    #[error("lane '{0}' is not registered")]
    UnknownLane(String),

    #[error("failed to open lane '{lane}': {source}")]
    Open {
        lane: String,
        #[source]
        source: VcsError,
    },

    #[error("failed to commit lane '{lane}': {source}")]
    Commit {
        lane: String,
        #[source]
        source: VcsError,
    },
}

/// Merge step failure. Always run-level: the baseline is left as it was.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merging lane '{lane}' failed, merge aborted: {source}")]
    Conflict {
        lane: String,
        #[source]
        source: VcsError,
    },

    #[error("integration step failed: {0}")]
    Integration(#[source] VcsError),

    #[error("lane '{0}' is not registered")]
    UnknownLane(String),
}

/// Successful merge
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Lanes merged, in merge order
    pub merged: Vec<String>,
}

/// Cleanup result; failures are warnings only
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub cleaned: Vec<String>,
    pub warnings: Vec<String>,
}

/// Owns the lane → workspace registry
pub struct LaneIsolationManager {
    vcs: Arc<dyn VcsBackend>,
    settings: IsolationSettings,
    date: String,
    /// Registration order is merge order
    lanes: Mutex<Vec<(String, LaneHandle)>>,
}

impl LaneIsolationManager {
    pub fn new(vcs: Arc<dyn VcsBackend>, settings: IsolationSettings, date: impl Into<String>) -> Self {
        Self {
            vcs,
            settings,
            date: date.into(),
            lanes: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &IsolationSettings {
        &self.settings
    }

    fn handle_for(&self, lane_id: &str) -> LaneHandle {
        LaneHandle {
            branch: format!("{}/{}-{}", self.settings.branch_prefix, lane_id, self.date),
            workspace: self
                .settings
                .workspace_root
                .join(format!("{}-{}", lane_id, self.date)),
        }
    }

    /// Create the lane's branch and working copy and register them.
    ///
    /// Not retried: a failure here removes the lane from the run.
    #[instrument(skip(self))]
    pub async fn open(&self, lane_id: &str) -> Result<LaneHandle, IsolationError> {
        let mut lanes = self.lanes.lock().await;
        if lanes.iter().any(|(id, _)| id == lane_id) {
            return Err(IsolationError::AlreadyOpen(lane_id.to_string()));
        }

        let handle = self.handle_for(lane_id);

        self.vcs
            .branch_create(&handle.branch, &self.settings.baseline)
            .await
            .map_err(|source| IsolationError::Open {
                lane: lane_id.to_string(),
                source,
            })?;

        if let Err(source) = self.vcs.workspace_create(&handle.workspace, &handle.branch).await {
            // Don't leave a dangling branch behind
            if let Err(e) = self.vcs.branch_delete(&handle.branch, true).await {
                warn!(branch = %handle.branch, error = %e, "Failed to roll back lane branch");
            }
            return Err(IsolationError::Open {
                lane: lane_id.to_string(),
                source,
            });
        }

        info!(lane = %lane_id, branch = %handle.branch, workspace = %handle.workspace.display(), "Lane opened");
        lanes.push((lane_id.to_string(), handle.clone()));
        Ok(handle)
    }

    /// Registered handle for a lane
    pub async fn handle(&self, lane_id: &str) -> Option<LaneHandle> {
        self.lanes
            .lock()
            .await
            .iter()
            .find(|(id, _)| id == lane_id)
            .map(|(_, handle)| handle.clone())
    }

    /// Registered lanes in registration order
    pub async fn registered(&self) -> Vec<String> {
        self.lanes.lock().await.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Commit everything in the lane's working copy
    pub async fn commit(&self, lane_id: &str, message: &str) -> Result<(), IsolationError> {
        let handle = self
            .handle(lane_id)
            .await
            .ok_or_else(|| IsolationError::UnknownLane(lane_id.to_string()))?;

        self.vcs
            .commit_all(&handle.workspace, message)
            .await
            .map_err(|source| IsolationError::Commit {
                lane: lane_id.to_string(),
                source,
            })
    }

    /// Merge the given lanes into the baseline, all or nothing.
    ///
    /// Lanes merge in registration order regardless of the order of `lane_ids`.
    #[instrument(skip(self, lane_ids), fields(lanes = lane_ids.len()))]
    pub async fn merge_all(&self, lane_ids: &[String]) -> Result<MergeReport, MergeError> {
        let ordered: Vec<(String, LaneHandle)> = {
            let lanes = self.lanes.lock().await;
            if let Some(unknown) = lane_ids.iter().find(|id| !lanes.iter().any(|(l, _)| l == *id)) {
                return Err(MergeError::UnknownLane(unknown.clone()));
            }
            lanes
                .iter()
                .filter(|(id, _)| lane_ids.contains(id))
                .cloned()
                .collect()
        };

        if ordered.is_empty() {
            return Ok(MergeReport::default());
        }

        let suffix = Utc::now().format("%H%M%S").to_string();
        let integration = format!("{}/integration-{}-{}", self.settings.branch_prefix, self.date, suffix);
        let integration_ws = self
            .settings
            .workspace_root
            .join(format!("integration-{}-{}", self.date, suffix));

        self.vcs
            .branch_create(&integration, &self.settings.baseline)
            .await
            .map_err(MergeError::Integration)?;

        if let Err(e) = self.vcs.workspace_create(&integration_ws, &integration).await {
            self.discard_integration(&integration, None).await;
            return Err(MergeError::Integration(e));
        }

        let mut merged = Vec::with_capacity(ordered.len());
        for (lane_id, handle) in &ordered {
            if let Err(source) = self
                .vcs
                .branch_merge(&integration_ws, &integration, &handle.branch)
                .await
            {
                warn!(lane = %lane_id, error = %source, "Lane merge failed, aborting merge step");
                self.discard_integration(&integration, Some(&integration_ws)).await;
                return Err(MergeError::Conflict {
                    lane: lane_id.clone(),
                    source,
                });
            }
            info!(lane = %lane_id, "Lane merged into integration branch");
            merged.push(lane_id.clone());
        }

        if let Err(e) = self
            .vcs
            .branch_merge(&self.settings.repo, &self.settings.baseline, &integration)
            .await
        {
            self.discard_integration(&integration, Some(&integration_ws)).await;
            return Err(MergeError::Integration(e));
        }

        // Fully merged now, so the safe delete applies
        if let Err(e) = self.vcs.workspace_remove(&integration_ws, false).await {
            warn!(error = %e, "Failed to remove integration workspace");
        }
        if let Err(e) = self.vcs.branch_delete(&integration, false).await {
            warn!(branch = %integration, error = %e, "Failed to delete integration branch");
        }

        info!(baseline = %self.settings.baseline, merged = merged.len(), "Merge completed");
        Ok(MergeReport { merged })
    }

    async fn discard_integration(&self, branch: &str, workspace: Option<&std::path::Path>) {
        if let Some(ws) = workspace {
            if let Err(e) = self.vcs.workspace_remove(ws, true).await {
                warn!(workspace = %ws.display(), error = %e, "Failed to remove integration workspace");
            }
        }
        if let Err(e) = self.vcs.branch_delete(branch, true).await {
            warn!(%branch, error = %e, "Failed to delete integration branch");
        }
    }

    /// Remove working copies and delete branches. Never fails.
    ///
    /// Working copies with uncommitted changes and unmerged branches are
    /// refused by the safe operations and left for inspection.
    #[instrument(skip(self, lane_ids), fields(lanes = lane_ids.len()))]
    pub async fn cleanup(&self, lane_ids: &[String]) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut lanes = self.lanes.lock().await;

        let targets: Vec<(String, LaneHandle)> = lanes
            .iter()
            .filter(|(id, _)| lane_ids.contains(id))
            .cloned()
            .collect();

        for (lane_id, handle) in targets {
            let mut clean = true;

            if let Err(e) = self.vcs.workspace_remove(&handle.workspace, false).await {
                warn!(lane = %lane_id, error = %e, "Failed to remove lane workspace");
                report.warnings.push(format!("{}: workspace kept: {}", lane_id, e));
                clean = false;
            }

            if let Err(e) = self.vcs.branch_delete(&handle.branch, false).await {
                warn!(lane = %lane_id, error = %e, "Failed to delete lane branch");
                report.warnings.push(format!("{}: branch kept: {}", lane_id, e));
                clean = false;
            }

            if clean {
                report.cleaned.push(lane_id.clone());
            }
            lanes.retain(|(id, _)| id != &lane_id);
        }

        report
    }
}
