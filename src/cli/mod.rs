//! Command-line interface for lanepress.
//!
//! Provides commands for running the daily pipeline, inspecting run
//! journals, redelivering persisted bundles, and showing configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config;
use crate::core::{DeliveryClient, DeliveryOutcome, MergeStatus, PipelineCoordinator, RunJournal, RunReport, RunSummary};
use crate::domain::LaneState;

/// lanepress - Multi-lane content generation and delivery pipeline
#[derive(Parser, Debug)]
#[command(name = "lanepress")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline for all (or some) categories
    Run {
        /// Only run these category ids (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Resend a persisted delivery failure
    Redeliver {
        /// Path to a failed_<date>.json record
        file: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { categories, json } => run_pipeline(&categories, json).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Redeliver { file } => redeliver(file).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Run the pipeline once
async fn run_pipeline(categories: &[String], json: bool) -> Result<()> {
    let cfg = config::config()?;

    for id in categories {
        if !cfg.pipeline.categories.iter().any(|c| &c.id == id) {
            anyhow::bail!("Unknown category '{}'", id);
        }
    }

    let coordinator = PipelineCoordinator::from_config(cfg)?;
    let report = coordinator.run(categories).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
        );
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Run ID: {}", report.run_id);
    println!("Date: {}", report.date);
    println!("Elapsed: {}s", report.elapsed_seconds);
    println!("\nLanes:");
    for lane in &report.lanes {
        match &lane.state {
            LaneState::Failed { error } => println!("  {:<14} failed: {}", lane.id, error),
            state => println!("  {:<14} {:?}", lane.id, state),
        }
    }

    for (category, missing) in &report.excluded_packages {
        println!("  {:<14} excluded (missing: {})", category, missing.join(", "));
    }

    match &report.merge {
        MergeStatus::Merged { lanes } => println!("\nMerge: merged {}", lanes.join(", ")),
        MergeStatus::Failed { error } => println!("\nMerge: FAILED - {}", error),
        MergeStatus::Skipped => println!("\nMerge: skipped (no completed lanes)"),
    }

    print_delivery(&report.delivery);

    for warning in &report.cleanup.warnings {
        println!("Cleanup warning: {}", warning);
    }

    eprintln!(
        "\n[Run {}: {} completed, {} failed]",
        report.run_id,
        report.completed_lanes(),
        report.failed_lanes()
    );
}

fn print_delivery(outcome: &DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Delivered { status, attempts } => {
            println!("Delivery: delivered (HTTP {}) after {} attempt(s)", status, attempts)
        }
        DeliveryOutcome::Deferred { path, attempts, error } => println!(
            "Delivery: failed after {} attempt(s): {}\n  Saved to {} (use `lanepress redeliver`)",
            attempts,
            error,
            path.display()
        ),
        DeliveryOutcome::Skipped { reason, persisted } => match persisted {
            Some(path) => println!("Delivery: skipped ({}), saved to {}", reason, path.display()),
            None => println!("Delivery: skipped ({})", reason),
        },
        DeliveryOutcome::Unpersisted { error, persist_error } => println!(
            "Delivery: FAILED and could not be saved\n  delivery: {}\n  store: {}",
            error, persist_error
        ),
    }
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let cfg = config::config()?;
    let journal = RunJournal::at(cfg.runs_dir(), run_id);
    let events = journal.replay().await?;
    if events.is_empty() {
        anyhow::bail!("Run {} not found", run_id);
    }

    let summary = RunSummary::from_events(run_id, &events);

    println!("Run ID: {}", summary.run_id);
    if let Some(started) = summary.started_at {
        println!("Started: {}", started);
    }
    match summary.finished_at {
        Some(finished) => println!("Finished: {}", finished),
        None => println!("Finished: (not finished)"),
    }
    println!("\nLanes:");
    for (id, lane) in &summary.lanes {
        let score = lane.last_score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        println!("  {:<14} {:<12} last score {}", id, lane.status, score);
        if !lane.failed_languages.is_empty() {
            println!("    failed languages: {}", lane.failed_languages.join(", "));
        }
        if let Some(error) = &lane.error {
            println!("    error: {}", error);
        }
    }
    match summary.merged {
        Some(true) => println!("\nMerge: merged"),
        Some(false) => println!("\nMerge: failed"),
        None => println!("\nMerge: not reached"),
    }
    if let Some(delivery) = &summary.delivery {
        println!("Delivery: {}", delivery);
    }

    Ok(())
}

/// List recent runs
async fn list_runs(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let runs = RunJournal::list_runs(cfg.runs_dir()).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<26} {:<10} {:<10}", "RUN ID", "STARTED", "COMPLETED", "FAILED");
    println!("{}", "-".repeat(86));

    for run_id in runs.into_iter().take(limit) {
        let events = RunJournal::at(cfg.runs_dir(), run_id).replay().await.unwrap_or_default();
        let summary = RunSummary::from_events(run_id, &events);
        let started = summary
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<26} {:<10} {:<10}",
            run_id,
            started,
            summary.completed_lanes(),
            summary.failed_lanes()
        );
    }

    Ok(())
}

/// Resend a persisted bundle byte-for-byte
async fn redeliver(file: PathBuf) -> Result<()> {
    let cfg = config::config()?;
    let coordinator = PipelineCoordinator::from_config(cfg)?;
    let client: DeliveryClient = coordinator.delivery_client();

    let outcome = client.redeliver(&file).await?;
    print_delivery(&outcome);

    if !outcome.is_delivered() {
        std::process::exit(1);
    }
    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let pipeline = &cfg.pipeline;

    println!("lanepress configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:            {}", cfg.home.display());
    println!("  Repository:      {}", pipeline.isolation.repo.display());
    println!("  Workspaces:      {}", pipeline.isolation.workspace_root.display());
    println!("  Runs:            {}", cfg.runs_dir().display());
    println!("  Failed delivery: {}", cfg.failed_dir().display());
    if let Some(dir) = &cfg.images_dir {
        println!("  Images:          {}", dir.display());
    }
    println!();
    println!("Git:");
    println!("  Baseline:      {}", pipeline.isolation.baseline);
    println!("  Branch prefix: {}", pipeline.isolation.branch_prefix);
    println!();
    println!("Categories:");
    for category in &pipeline.categories {
        println!("  {:<14} {}", category.id, category.subject);
    }
    println!();
    println!("Languages:");
    for language in &pipeline.languages {
        println!("  {:<4} {}", language.code, language.name);
    }
    println!();
    println!("Quality:");
    println!("  Publish threshold: {}", pipeline.quality.publish_threshold);
    println!("  Improve threshold: {}", pipeline.quality.improve_threshold);
    println!("  Translation attempts: {}", pipeline.quality.max_translation_attempts);
    println!();
    println!("Services:");
    println!("  Azure endpoint:  {}", cfg.services.azure_endpoint);
    println!("  Azure key:       {}", if cfg.services.azure_key.is_some() { "(set)" } else { "(missing)" });
    println!("  Research:        {}", cfg.services.perplexity_endpoint);
    println!("  Research key:    {}", if cfg.services.perplexity_key.is_some() { "(set)" } else { "(missing)" });
    println!(
        "  Webhook:         {}",
        if cfg.services.webhook_url.is_some() { "(set)" } else { "(missing)" }
    );

    Ok(())
}
