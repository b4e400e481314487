//! lanepress - Multi-lane content generation and delivery pipeline
//!
//! Produces one market article per category per day, translates it into
//! several languages, scores everything through a quality gate, and ships
//! the complete packages to a webhook as one bundle.
//!
//! # Architecture
//!
//! Each category runs as an isolated lane:
//! - Lanes get their own branch and working copy and run concurrently
//! - One lane failing never affects its siblings
//! - Completed lanes are merged all-or-nothing into the baseline
//! - Undelivered bundles are persisted byte-for-byte for redelivery
//! - Every run leaves an append-only event journal
//!
//! # Modules
//!
//! - `adapters`: External systems (Azure OpenAI, Perplexity, webhook, git, images, prompts)
//! - `core`: Engine (retry, quality gate, fan-out, isolation, delivery, coordinator)
//! - `domain`: Data structures (Artifact, Language, Lane, ArticlePackage, Event)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run every configured category
//! lanepress run
//!
//! # Check run status
//! lanepress status <run-id>
//!
//! # Resend a persisted bundle
//! lanepress redeliver ~/.lanepress/failed_deliveries/failed_2025-10-20.json
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{PipelineCoordinator, RunReport};
pub use domain::{ArticlePackage, Artifact, Event, EventType, Lane, LaneState, Language};
