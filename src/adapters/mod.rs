//! Adapter interfaces for external systems.
//!
//! The engine talks to every collaborator through a trait defined here:
//! research, text generation (articles, translations, scoring, improvement,
//! SEO), delivery and version control. Concrete HTTP/subprocess
//! implementations live in the submodules.

pub mod azure;
pub mod git;
pub mod images;
pub mod perplexity;
pub mod prompts;
pub mod webhook;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::retry::CallError;

pub use azure::AzureOpenAiClient;
pub use git::GitCli;
pub use images::ImageCatalog;
pub use perplexity::PerplexityClient;
pub use webhook::WebhookSink;

/// A request to the generation collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// User prompt
    pub prompt: String,

    /// Deployment/model selector
    pub deployment: String,

    /// Completion token cap
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            deployment: deployment.into(),
            max_tokens: 1500,
            temperature: 0.7,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Token accounting reported by the generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Output from a generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    /// The generated text
    pub content: String,

    /// Tokens used (if reported)
    pub usage: Option<TokenUsage>,
}

impl GenerationOutput {
    /// Create a new output with just content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Text generation collaborator
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Run one generation request. No retries; callers decide.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, CallError>;
}

/// Market research result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutput {
    /// Whether the research produced anything usable
    pub success: bool,

    /// Free-text market summary, passed through as generation context
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drivers: Option<String>,
}

/// Web research collaborator
#[async_trait]
pub trait Researcher: Send + Sync {
    fn name(&self) -> &str;

    /// Research the market for one category
    async fn research(&self, category: &str) -> Result<ResearchOutput, CallError>;
}

/// Downstream sink for the finished bundle
#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &str;

    /// Send the serialized bundle; returns the (2xx) status on success
    async fn send(&self, payload: &[u8]) -> Result<u16, CallError>;
}

/// Version-control operation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VcsError {
    #[error("merge conflict merging '{branch}' into '{into}': {detail}")]
    Conflict {
        into: String,
        branch: String,
        detail: String,
    },

    #[error("git {op} failed: {detail}")]
    Command { op: String, detail: String },
}

/// Version-control isolation boundary.
///
/// Each operation either succeeds or fails as a whole.
#[async_trait]
pub trait VcsBackend: Send + Sync {
    /// Create `branch` pointing at `from`
    async fn branch_create(&self, branch: &str, from: &str) -> Result<(), VcsError>;

    /// Merge `branch` into `into` inside the working copy at `workdir`
    async fn branch_merge(&self, workdir: &Path, into: &str, branch: &str) -> Result<(), VcsError>;

    /// Delete `branch`; without `force`, unmerged branches are refused
    async fn branch_delete(&self, branch: &str, force: bool) -> Result<(), VcsError>;

    /// Create a working copy of `branch` at `path`
    async fn workspace_create(&self, path: &Path, branch: &str) -> Result<(), VcsError>;

    /// Remove the working copy at `path`
    async fn workspace_remove(&self, path: &Path, force: bool) -> Result<(), VcsError>;

    /// Stage and commit everything in the working copy at `workspace`
    async fn commit_all(&self, workspace: &Path, message: &str) -> Result<(), VcsError>;
}

/// Deployment names for each kind of generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_standard_model")]
    pub article: String,
    #[serde(default = "default_standard_model")]
    pub translation: String,
    #[serde(default = "default_pro_model")]
    pub scoring: String,
    #[serde(default = "default_standard_model")]
    pub translation_scoring: String,
    #[serde(default = "default_pro_model")]
    pub improvement: String,
    #[serde(default = "default_standard_model")]
    pub seo: String,
}

fn default_standard_model() -> String {
    "gpt-5".to_string()
}
fn default_pro_model() -> String {
    "gpt-5-pro".to_string()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            article: default_standard_model(),
            translation: default_standard_model(),
            scoring: default_pro_model(),
            translation_scoring: default_standard_model(),
            improvement: default_pro_model(),
            seo: default_standard_model(),
        }
    }
}
