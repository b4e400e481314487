//! Domain types for the content pipeline.
//!
//! This module contains the core data structures:
//! - Artifact: generated text (primary or translation)
//! - Lane: one category's trip through the pipeline
//! - ValidationResult: quality gate output
//! - ArticlePackage / DeliveryBundle: what gets delivered
//! - Events: run journal records

pub mod artifact;
pub mod events;
pub mod lane;
pub mod language;
pub mod package;
pub mod validation;

// Re-export commonly used types
pub use artifact::{word_count, Artifact, ArtifactKind};
pub use events::{Event, EventType};
pub use lane::{Category, Lane, LaneHandle, LaneState};
pub use language::{Language, Script};
pub use package::{
    ArticlePackage, BundleArticle, BundleMetadata, DeliveryBundle, ImageRef, LanguageEntry,
    SeoMetadata,
};
pub use validation::{Decision, Stage, ValidationResult};
