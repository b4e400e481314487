//! Append-only run journal.
//!
//! Events are stored as newline-delimited JSON (JSONL) under
//! `{home}/runs/{run_id}/events.jsonl`, one file per run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Event, EventType};

/// File-based journal for one run
pub struct RunJournal {
    run_id: Uuid,

    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl RunJournal {
    /// Create or open the journal for a run under `runs_dir`
    pub async fn open(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = runs_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        Ok(Self {
            run_id,
            events_path: run_dir.join("events.jsonl"),
            run_dir,
        })
    }

    /// Journal handle without touching the filesystem. Appends fail (and are
    /// logged) until the run directory exists.
    pub fn at(runs_dir: &Path, run_id: Uuid) -> Self {
        let run_dir = runs_dir.join(run_id.to_string());
        Self {
            run_id,
            events_path: run_dir.join("events.jsonl"),
            run_dir,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Append, logging instead of failing. The journal never fails a run.
    pub async fn record(&self, event: Event) {
        if let Err(e) = self.append(&event).await {
            warn!(event_type = ?event.event_type, error = %e, "Failed to record journal event");
        }
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event =
                serde_json::from_str(&line).with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// List run IDs under `runs_dir`, most recently modified first
    pub async fn list_runs(runs_dir: &Path) -> Result<Vec<Uuid>> {
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(runs_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(uuid) = entry.file_name().to_str().and_then(|n| Uuid::parse_str(n).ok()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .ok();
            runs.push((modified, uuid));
        }

        runs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(runs.into_iter().map(|(_, id)| id).collect())
    }
}

/// Per-lane view reconstructed from events
#[derive(Debug, Clone, Default, Serialize)]
pub struct LaneSummary {
    /// Last phase or terminal state seen
    pub status: String,

    pub last_score: Option<u8>,

    pub failed_languages: Vec<String>,

    pub error: Option<String>,
}

/// Run view reconstructed from events
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub lanes: BTreeMap<String, LaneSummary>,

    /// `Some(true)` merged, `Some(false)` merge failed, `None` not reached
    pub merged: Option<bool>,

    pub delivery: Option<String>,
}

impl RunSummary {
    pub fn from_events(run_id: Uuid, events: &[Event]) -> Self {
        let mut summary = RunSummary {
            run_id,
            started_at: None,
            finished_at: None,
            lanes: BTreeMap::new(),
            merged: None,
            delivery: None,
        };

        for event in events {
            let lane = event
                .lane
                .as_ref()
                .map(|id| summary.lanes.entry(id.clone()).or_default());

            match (event.event_type, lane) {
                (EventType::RunStarted, _) => summary.started_at = Some(event.timestamp),
                (EventType::RunCompleted, _) => summary.finished_at = Some(event.timestamp),
                (EventType::LaneOpened, Some(l)) => l.status = "opened".to_string(),
                (EventType::LanePhase, Some(l)) => l.status = event.summary.clone(),
                (EventType::ValidationScored, Some(l)) => l.last_score = event.score,
                (EventType::LanguageFailed, Some(l)) => l.failed_languages.push(event.summary.clone()),
                (EventType::LaneCompleted, Some(l)) => l.status = "completed".to_string(),
                (EventType::LaneFailed, Some(l)) => {
                    l.status = "failed".to_string();
                    l.error = event.error.clone();
                }
                (EventType::MergeCompleted, _) => summary.merged = Some(true),
                (EventType::MergeFailed, _) => summary.merged = Some(false),
                (EventType::DeliverySucceeded, _) | (EventType::DeliveryDeferred, _) => {
                    summary.delivery = Some(event.summary.clone())
                }
                _ => {}
            }
        }

        summary
    }

    pub fn completed_lanes(&self) -> usize {
        self.lanes.values().filter(|l| l.status == "completed").count()
    }

    pub fn failed_lanes(&self) -> usize {
        self.lanes.values().filter(|l| l.status == "failed").count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, ValidationResult};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_summary_from_replay() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let journal = RunJournal::open(temp.path(), run_id).await.unwrap();

        let forex = Some("forex".to_string());
        let crypto = Some("crypto".to_string());
        journal.record(Event::new(run_id, None, EventType::RunStarted, "2 lanes")).await;
        journal.record(Event::new(run_id, forex.clone(), EventType::LaneOpened, "daily/forex")).await;
        journal
            .record(
                Event::new(run_id, forex.clone(), EventType::ValidationScored, "article")
                    .with_validation(&ValidationResult::local(85, Decision::Accept, "ok")),
            )
            .await;
        journal.record(Event::new(run_id, forex.clone(), EventType::LanguageFailed, "ar")).await;
        journal.record(Event::new(run_id, forex, EventType::LaneCompleted, "done")).await;
        journal
            .record(Event::new(run_id, crypto, EventType::LaneFailed, "rejected").with_error("score 20"))
            .await;
        journal.record(Event::new(run_id, None, EventType::MergeCompleted, "1 lane")).await;

        let events = journal.replay().await.unwrap();
        let summary = RunSummary::from_events(run_id, &events);

        assert!(summary.started_at.is_some());
        assert_eq!(summary.merged, Some(true));
        assert_eq!(summary.completed_lanes(), 1);
        assert_eq!(summary.failed_lanes(), 1);
        assert_eq!(summary.lanes["forex"].last_score, Some(85));
        assert_eq!(summary.lanes["forex"].failed_languages, vec!["ar".to_string()]);
        assert_eq!(summary.lanes["crypto"].error.as_deref(), Some("score 20"));
    }
}
