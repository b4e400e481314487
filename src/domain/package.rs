//! Per-lane article packages and the delivery bundle built from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::Artifact;
use super::language::Language;

/// SEO metadata for the primary article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub image_alt: String,
}

impl SeoMetadata {
    /// Deterministic metadata used when the generator's answer is unusable
    pub fn fallback(category: &str, subject: &str) -> Self {
        let category_title = title_case(category);
        Self {
            title: format!("{} Analysis Today | {} Trading", subject, category_title),
            description: format!(
                "Professional {} market analysis for {} traders: real-time insights, technical analysis and trading opportunities.",
                subject, category
            ),
            keywords: vec![
                subject.to_string(),
                format!("{} trading", category),
                "market analysis".to_string(),
                "trading insights".to_string(),
            ],
            image_alt: format!("{} {} trading chart showing market analysis", subject, category),
        }
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Image attached to a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
}

/// Everything one lane produced. Immutable after assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticlePackage {
    /// Category the lane covered
    pub category: String,

    /// Subject of the article
    pub subject: String,

    /// Accepted primary article (possibly an improved one)
    pub primary: Artifact,

    /// Score of the primary article
    pub primary_score: u8,

    /// Whether the primary article went through the improvement pass
    pub improved: bool,

    /// Successful translations keyed by language code
    pub translations: BTreeMap<String, Artifact>,

    /// Final score of each successful translation
    pub translation_scores: BTreeMap<String, u8>,

    /// Languages that did not make it, with the reason
    pub failed_languages: BTreeMap<String, String>,

    pub seo: SeoMetadata,

    pub image: ImageRef,

    pub generated_at: DateTime<Utc>,
}

impl ArticlePackage {
    /// Number of languages present, primary included
    pub fn language_count(&self) -> usize {
        1 + self.translations.len()
    }

    /// Requested language codes with no successful translation
    pub fn missing_languages(&self, requested: &[Language]) -> Vec<String> {
        requested
            .iter()
            .filter(|l| !self.translations.contains_key(&l.code))
            .map(|l| l.code.clone())
            .collect()
    }

    /// Primary plus every requested translation present
    pub fn is_complete(&self, requested: &[Language]) -> bool {
        self.missing_languages(requested).is_empty()
    }

    /// All scores in the package, primary first
    pub fn scores(&self) -> impl Iterator<Item = u8> + '_ {
        std::iter::once(self.primary_score).chain(self.translation_scores.values().copied())
    }

    /// Language entries in delivery shape
    pub fn language_entries(&self) -> BTreeMap<String, LanguageEntry> {
        let mut entries = BTreeMap::new();
        entries.insert(
            self.primary.language.clone(),
            LanguageEntry {
                language: self.primary.language_name.clone(),
                header: self.seo.title.clone(),
                content: self.primary.text.clone(),
            },
        );
        for (code, artifact) in &self.translations {
            entries.insert(
                code.clone(),
                LanguageEntry {
                    language: artifact.language_name.clone(),
                    header: artifact.headline().unwrap_or_else(|| self.seo.title.clone()),
                    content: artifact.text.clone(),
                },
            );
        }
        entries
    }
}

/// One language of one article in the delivery payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub language: String,
    pub header: String,
    pub content: String,
}

/// One article in the delivery payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleArticle {
    pub article_type: String,
    pub specific_asset: String,
    pub image_url: String,
    pub languages: BTreeMap<String, LanguageEntry>,
}

impl From<&ArticlePackage> for BundleArticle {
    fn from(package: &ArticlePackage) -> Self {
        Self {
            article_type: package.category.clone(),
            specific_asset: package.subject.clone(),
            image_url: package.image.url.clone(),
            languages: package.language_entries(),
        }
    }
}

/// Run-level metadata sent with the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub date: String,
    pub execution_time_seconds: u64,
    pub articles_generated: usize,
    pub total_translations: usize,
    pub languages_per_article: usize,
    pub average_quality_score: f64,
    pub categories: Vec<String>,
    pub assets: Vec<String>,
    pub lanes_failed: usize,
    pub system: String,
}

impl BundleMetadata {
    /// Summarize the packages going into a bundle
    pub fn summarize(
        packages: &[ArticlePackage],
        date: &str,
        execution_time_seconds: u64,
        languages_per_article: usize,
        lanes_failed: usize,
    ) -> Self {
        let scores: Vec<u8> = packages.iter().flat_map(|p| p.scores()).collect();
        let average = if scores.is_empty() {
            0.0
        } else {
            let sum: u64 = scores.iter().map(|&s| s as u64).sum();
            (sum as f64 / scores.len() as f64 * 100.0).round() / 100.0
        };

        Self {
            date: date.to_string(),
            execution_time_seconds,
            articles_generated: packages.len(),
            total_translations: packages.iter().map(|p| p.translations.len()).sum(),
            languages_per_article,
            average_quality_score: average,
            categories: packages.iter().map(|p| p.category.clone()).collect(),
            assets: packages.iter().map(|p| p.subject.clone()).collect(),
            lanes_failed,
            system: format!("lanepress/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// The payload delivered to the downstream sink. Built once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryBundle {
    pub generated_at: DateTime<Utc>,
    pub articles: Vec<BundleArticle>,
    pub metadata: BundleMetadata,
}

impl DeliveryBundle {
    /// Assemble the bundle from complete packages
    pub fn assemble(
        generated_at: DateTime<Utc>,
        packages: &[ArticlePackage],
        metadata: BundleMetadata,
    ) -> Self {
        Self {
            generated_at,
            articles: packages.iter().map(BundleArticle::from).collect(),
            metadata,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}
