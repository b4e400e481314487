//! Shared in-memory collaborators for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lanepress::adapters::{
    DeliverySink, GenerationOutput, GenerationRequest, Generator, ImageCatalog, ResearchOutput,
    Researcher, VcsBackend, VcsError,
};
use lanepress::core::{
    CallError, Collaborators, IsolationSettings, PipelineSettings, QualitySettings, RetryPolicy,
};
use lanepress::domain::{Category, Language};

type Reply = dyn Fn(&GenerationRequest) -> Result<String, CallError> + Send + Sync;

/// Generator answering through a closure and recording every prompt
pub struct FakeGenerator {
    reply: Box<Reply>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(reply: impl Fn(&GenerationRequest) -> Result<String, CallError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Calls whose prompt starts with `prefix` and mentions `needle`
    pub fn calls_matching(&self, prefix: &str, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix) && p.contains(needle))
            .count()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, CallError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        (self.reply)(request).map(GenerationOutput::new)
    }
}

/// Researcher that always succeeds, optionally failing some categories
pub struct FakeResearcher {
    fail: HashSet<String>,
    calls: AtomicU32,
}

impl FakeResearcher {
    pub fn new() -> Arc<Self> {
        Self::failing(&[])
    }

    pub fn failing(categories: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail: categories.iter().map(|c| c.to_string()).collect(),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Researcher for FakeResearcher {
    fn name(&self) -> &str {
        "fake-research"
    }

    async fn research(&self, category: &str) -> Result<ResearchOutput, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.contains(category) {
            return Err(CallError::Fatal(format!("no research for {}", category)));
        }
        Ok(ResearchOutput {
            success: true,
            summary: format!("{} markets were active today", category),
            price: Some("1.0850".to_string()),
            change: Some("+0.3%".to_string()),
            drivers: Some("central bank commentary".to_string()),
        })
    }
}

/// Sink that records every payload and answers with a fixed result
pub struct RecordingSink {
    status: Result<u16, CallError>,
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            status: Ok(200),
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            status: Err(CallError::Upstream {
                status: 503,
                body: "unavailable".to_string(),
            }),
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, payload: &[u8]) -> Result<u16, CallError> {
        self.payloads.lock().unwrap().push(payload.to_vec());
        self.status.clone()
    }
}

/// Version control double. Working copies are real directories so lanes
/// can write packages into them.
#[derive(Default)]
pub struct FakeVcs {
    ops: Mutex<Vec<String>>,
    /// Merging a branch containing this text conflicts
    conflict_on: Option<String>,
    /// Creating a workspace for a branch containing this text fails
    fail_workspace_on: Option<String>,
}

impl FakeVcs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn conflicting_on(branch: &str) -> Arc<Self> {
        Arc::new(Self {
            conflict_on: Some(branch.to_string()),
            ..Default::default()
        })
    }

    pub fn failing_workspace_on(branch: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_workspace_on: Some(branch.to_string()),
            ..Default::default()
        })
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Recorded operations starting with `prefix`
    pub fn ops_starting(&self, prefix: &str) -> Vec<String> {
        self.ops().into_iter().filter(|op| op.starts_with(prefix)).collect()
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl VcsBackend for FakeVcs {
    async fn branch_create(&self, branch: &str, from: &str) -> Result<(), VcsError> {
        self.record(format!("create {} from {}", branch, from));
        Ok(())
    }

    async fn branch_merge(&self, _workdir: &Path, into: &str, branch: &str) -> Result<(), VcsError> {
        if let Some(marker) = &self.conflict_on {
            if branch.contains(marker.as_str()) {
                self.record(format!("conflict {} into {}", branch, into));
                return Err(VcsError::Conflict {
                    into: into.to_string(),
                    branch: branch.to_string(),
                    detail: "CONFLICT (content): Merge conflict in articles".to_string(),
                });
            }
        }
        self.record(format!("merge {} into {}", branch, into));
        Ok(())
    }

    async fn branch_delete(&self, branch: &str, force: bool) -> Result<(), VcsError> {
        self.record(format!("delete {}{}", branch, if force { " --force" } else { "" }));
        Ok(())
    }

    async fn workspace_create(&self, path: &Path, branch: &str) -> Result<(), VcsError> {
        if let Some(marker) = &self.fail_workspace_on {
            if branch.contains(marker.as_str()) {
                return Err(VcsError::Command {
                    op: "worktree".to_string(),
                    detail: format!("cannot create {}", path.display()),
                });
            }
        }
        std::fs::create_dir_all(path).map_err(|e| VcsError::Command {
            op: "worktree".to_string(),
            detail: e.to_string(),
        })?;
        self.record(format!("worktree add {}", branch));
        Ok(())
    }

    async fn workspace_remove(&self, path: &Path, force: bool) -> Result<(), VcsError> {
        let _ = std::fs::remove_dir_all(path);
        self.record(format!(
            "worktree remove {}{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            if force { " --force" } else { "" }
        ));
        Ok(())
    }

    async fn commit_all(&self, workspace: &Path, message: &str) -> Result<(), VcsError> {
        self.record(format!(
            "commit {}: {}",
            workspace.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            message
        ));
        Ok(())
    }
}

/// `words` space-separated words of English text
pub fn english_text(words: usize) -> String {
    let mut text = String::from("# Market Update\n\n");
    text.push_str(&vec!["market"; words.saturating_sub(3)].join(" "));
    text
}

/// Scorer reply wrapped in a fenced block, the way chat models answer
pub fn score_reply(score: u8) -> String {
    format!(
        "Here is my review:\n```json\n{{\"quality_score\": {}, \"issues\": [], \"strengths\": [\"clear\"], \"improvements_needed\": []}}\n```",
        score
    )
}

pub fn seo_reply() -> String {
    r#"{"title": "EUR/USD Today", "description": "Daily EUR/USD analysis", "keywords": ["EUR/USD"], "image_alt": "EUR/USD chart"}"#
        .to_string()
}

/// A translation of roughly `words` words for `language`
pub fn translated_text(language: &str, words: usize) -> String {
    let word = if language == "Arabic (Gulf)" { "السوق" } else { "mercado" };
    vec![word; words].join(" ")
}

/// Generator that behaves well for every kind of request
pub fn happy_generator(article_words: usize, article_score: u8) -> Arc<FakeGenerator> {
    FakeGenerator::new(move |request| {
        let p = request.prompt.as_str();
        if p.starts_with("Write a professional") {
            Ok(english_text(article_words))
        } else if p.starts_with("Review this") {
            Ok(score_reply(article_score))
        } else if p.starts_with("Improve this") {
            Ok(format!("{}\n\nImproved outlook.", english_text(article_words)))
        } else if p.starts_with("Translate this") {
            let name = if p.contains("Arabic (Gulf)") { "Arabic (Gulf)" } else { "Spanish" };
            Ok(translated_text(name, article_words))
        } else if p.starts_with("Validate this") {
            Ok(score_reply(85))
        } else if p.starts_with("Generate SEO metadata") {
            Ok(seo_reply())
        } else {
            Err(CallError::Fatal(format!(
                "unexpected prompt: {}",
                p.chars().take(40).collect::<String>()
            )))
        }
    })
}

/// Two translation targets: Arabic and Spanish
pub fn languages() -> Vec<Language> {
    vec![Language::arabic_gcc(), Language::spanish()]
}

/// Quality settings without waits between translation attempts
pub fn quality() -> QualitySettings {
    QualitySettings {
        translation_retry_delay_ms: 0,
        ..Default::default()
    }
}

pub fn settings(root: &Path, categories: Vec<Category>) -> PipelineSettings {
    PipelineSettings {
        categories,
        source_language: Language::english(),
        languages: languages(),
        quality: quality(),
        models: Default::default(),
        generation_retry: RetryPolicy::immediate(3),
        delivery_retry: RetryPolicy::immediate(3),
        isolation: IsolationSettings {
            repo: root.join("repo"),
            workspace_root: root.join("lanes"),
            baseline: "main".to_string(),
            branch_prefix: "daily".to_string(),
        },
        runs_dir: root.join("runs"),
        failed_dir: root.join("failed"),
    }
}

pub fn collaborators(
    generator: Arc<FakeGenerator>,
    researcher: Arc<FakeResearcher>,
    sink: Arc<RecordingSink>,
    vcs: Arc<FakeVcs>,
) -> Collaborators {
    Collaborators {
        researcher,
        generator: generator.clone(),
        translator: generator.clone(),
        scorer: generator.clone(),
        improver: generator,
        sink,
        vcs,
        images: Arc::new(ImageCatalog::new("https://images.example/trading", None)),
    }
}
