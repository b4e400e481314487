//! Configuration for lanepress.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LANEPRESS_HOME, LANEPRESS_REPO, credentials, endpoints)
//! 2. Config file (.lanepress/config.yaml)
//! 3. Defaults (~/.lanepress)
//!
//! Config file discovery:
//! - Searches current directory and parents for .lanepress/config.yaml
//! - Paths in config file are relative to the project root (parent of .lanepress/),
//!   except `home`, which is relative to .lanepress/ itself
//!
//! Credentials are only ever read from the environment.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::ModelSettings;
use crate::core::{IsolationSettings, PipelineSettings, QualitySettings, RetryPolicy};
use crate::domain::{Category, Language};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".lanepress";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub categories: Option<Vec<Category>>,
    #[serde(default)]
    pub languages: Option<Vec<Language>>,
    #[serde(default)]
    pub quality: QualitySettings,
    #[serde(default)]
    pub models: ModelSettings,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .lanepress/)
    pub home: Option<String>,
    /// Content repository lanes branch from
    pub repo: Option<String>,
    /// Where lane working copies are created
    pub workspace_root: Option<String>,
    /// Local mirror of the image repository
    pub images_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitConfig {
    pub baseline: Option<String>,
    pub branch_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
    pub generation: Option<RetryPolicy>,
    pub delivery: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicesConfig {
    pub azure_endpoint: Option<String>,
    pub azure_api_version: Option<String>,
    pub perplexity_endpoint: Option<String>,
    pub perplexity_model: Option<String>,
    pub webhook_url: Option<String>,
    pub images_base_url: Option<String>,
    pub request_timeout_seconds: Option<u64>,
    pub delivery_timeout_seconds: Option<u64>,
}

/// Endpoints, credentials and timeouts for the HTTP adapters
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub azure_endpoint: String,
    pub azure_key: Option<String>,
    pub azure_api_version: String,
    pub perplexity_endpoint: String,
    pub perplexity_key: Option<String>,
    pub perplexity_model: String,
    pub webhook_url: Option<String>,
    pub images_base_url: String,
    pub request_timeout: Duration,
    pub delivery_timeout: Duration,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to lanepress home (engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Local image mirror, if configured
    pub images_dir: Option<PathBuf>,
    pub pipeline: PipelineSettings,
    pub services: ServiceSettings,
}

impl ResolvedConfig {
    /// Run journals ($LANEPRESS_HOME/runs)
    pub fn runs_dir(&self) -> &Path {
        &self.pipeline.runs_dir
    }

    /// Undelivered bundles ($LANEPRESS_HOME/failed_deliveries)
    pub fn failed_dir(&self) -> &Path {
        &self.pipeline.failed_dir
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Build the resolved configuration from an optional config file and an
/// environment lookup
fn resolve(
    config_file: Option<(PathBuf, ConfigFile)>,
    env: &dyn Fn(&str) -> Option<String>,
    default_home: PathBuf,
    cwd: PathBuf,
) -> ResolvedConfig {
    let (config_path, file) = match config_file {
        Some((path, file)) => (Some(path), Some(file)),
        None => (None, None),
    };

    // Project root is the parent of .lanepress/; home is relative to .lanepress/
    let config_dir = config_path.as_ref().and_then(|p| p.parent().map(Path::to_path_buf));
    let base_dir = config_dir
        .as_ref()
        .and_then(|d| d.parent().map(Path::to_path_buf))
        .unwrap_or(cwd);

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

    let home = if let Some(env_home) = env("LANEPRESS_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(dir)) = (paths.home.as_deref(), config_dir.as_deref()) {
        resolve_path(dir, home_path)
    } else {
        default_home
    };

    let repo = if let Some(env_repo) = env("LANEPRESS_REPO") {
        PathBuf::from(env_repo)
    } else if let Some(repo_path) = paths.repo.as_deref() {
        resolve_path(&base_dir, repo_path)
    } else {
        base_dir.clone()
    };

    let workspace_root = paths
        .workspace_root
        .as_deref()
        .map(|p| resolve_path(&base_dir, p))
        .unwrap_or_else(|| home.join("workspaces"));

    let images_dir = paths.images_dir.as_deref().map(|p| resolve_path(&base_dir, p));

    let git = file.as_ref().map(|f| f.git.clone()).unwrap_or_default();
    let retry = file.as_ref().map(|f| f.retry.clone()).unwrap_or_default();
    let services = file.as_ref().map(|f| f.services.clone()).unwrap_or_default();

    let pipeline = PipelineSettings {
        categories: file
            .as_ref()
            .and_then(|f| f.categories.clone())
            .unwrap_or_else(Category::defaults),
        source_language: Language::english(),
        languages: file
            .as_ref()
            .and_then(|f| f.languages.clone())
            .unwrap_or_else(Language::default_targets),
        quality: file.as_ref().map(|f| f.quality.clone()).unwrap_or_default(),
        models: file.as_ref().map(|f| f.models.clone()).unwrap_or_default(),
        generation_retry: retry.generation.unwrap_or_default(),
        delivery_retry: retry.delivery.unwrap_or_else(RetryPolicy::delivery),
        isolation: IsolationSettings {
            repo,
            workspace_root,
            baseline: git.baseline.unwrap_or_else(|| "main".to_string()),
            branch_prefix: git.branch_prefix.unwrap_or_else(|| "daily".to_string()),
        },
        runs_dir: home.join("runs"),
        failed_dir: home.join("failed_deliveries"),
    };

    let services = ServiceSettings {
        azure_endpoint: env("AZURE_OPENAI_ENDPOINT")
            .or(services.azure_endpoint)
            .unwrap_or_default(),
        azure_key: env("AZURE_OPENAI_KEY"),
        azure_api_version: services
            .azure_api_version
            .unwrap_or_else(|| "2025-01-01-preview".to_string()),
        perplexity_endpoint: env("PERPLEXITY_ENDPOINT")
            .or(services.perplexity_endpoint)
            .unwrap_or_else(|| "https://api.perplexity.ai/chat/completions".to_string()),
        perplexity_key: env("PERPLEXITY_API_KEY"),
        perplexity_model: services.perplexity_model.unwrap_or_else(|| "sonar".to_string()),
        webhook_url: env("WEBHOOK_URL").or(services.webhook_url),
        images_base_url: env("IMAGES_BASE_URL")
            .or(services.images_base_url)
            .unwrap_or_else(|| "https://raw.githubusercontent.com/lanepress/trading-images/main".to_string()),
        request_timeout: Duration::from_secs(services.request_timeout_seconds.unwrap_or(120)),
        delivery_timeout: Duration::from_secs(services.delivery_timeout_seconds.unwrap_or(30)),
    };

    ResolvedConfig {
        home,
        config_file: config_path,
        images_dir,
        pipeline,
        services,
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    let config_file = match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    Ok(resolve(config_file, &process_env, default_home, cwd))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
