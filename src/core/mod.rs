//! Core pipeline engine.
//!
//! This module contains:
//! - RetryableCaller: bounded retries for outbound calls
//! - QualityGate: score → decision, improvement pass
//! - TranslationFanOut: concurrent per-language translate/validate workflows
//! - LaneIsolationManager: per-lane branches and working copies
//! - DeliveryClient: delivery with retry and a durable failure store
//! - PipelineCoordinator: the run state machine
//! - RunJournal: append-only run events

pub mod coordinator;
pub mod delivery;
pub mod isolation;
pub mod journal;
pub mod json_extract;
pub mod lane;
pub mod quality;
pub mod retry;
pub mod translation;

// Re-export commonly used types
pub use coordinator::{Collaborators, MergeStatus, PipelineCoordinator, PipelineSettings, RunReport};
pub use delivery::{DeliveryClient, DeliveryOutcome, FailedDelivery};
pub use isolation::{
    CleanupReport, IsolationError, IsolationSettings, LaneIsolationManager, MergeError, MergeReport,
};
pub use journal::{RunJournal, RunSummary};
pub use lane::{LaneError, LaneServices, LaneWorkflow};
pub use quality::{ArticleVerdict, QualityGate, QualitySettings};
pub use retry::{Backoff, CallError, CallFailure, ErrorClass, RetryPolicy, RetryableCaller};
pub use translation::{FanOutResult, TranslationFanOut, TranslationOutcome, TranslationTask};
