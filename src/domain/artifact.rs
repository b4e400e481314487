//! Generated text artifacts.
//!
//! An artifact is immutable once accepted. Improving an article produces a new
//! artifact that points back at the one it supersedes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::language::Language;

/// A piece of generated text (primary article or one translation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier for this artifact
    pub id: Uuid,

    /// How the artifact came to be
    pub kind: ArtifactKind,

    /// Language code (e.g. "en", "ar", "pt-BR")
    pub language: String,

    /// Display name of the language
    pub language_name: String,

    /// Raw generated text
    pub text: String,

    /// Whitespace-delimited word count of `text`
    pub word_count: usize,

    /// Artifact this one was derived from (translation source or improved original)
    pub derived_from: Option<Uuid>,

    /// When the artifact was created
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a new artifact
    pub fn new(kind: ArtifactKind, language: &Language, text: String) -> Self {
        let word_count = word_count(&text);
        Self {
            id: Uuid::new_v4(),
            kind,
            language: language.code.clone(),
            language_name: language.name.clone(),
            text,
            word_count,
            derived_from: None,
            created_at: Utc::now(),
        }
    }

    /// Create the primary article artifact
    pub fn primary(language: &Language, text: String) -> Self {
        Self::new(ArtifactKind::Primary, language, text)
    }

    /// Create a translation derived from `source`
    pub fn translation(source: &Artifact, language: &Language, text: String) -> Self {
        let mut artifact = Self::new(ArtifactKind::Translation, language, text);
        artifact.derived_from = Some(source.id);
        artifact
    }

    /// Produce the artifact that supersedes this one after improvement
    pub fn supersede(&self, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ArtifactKind::Improved,
            language: self.language.clone(),
            language_name: self.language_name.clone(),
            word_count: word_count(&text),
            text,
            derived_from: Some(self.id),
            created_at: Utc::now(),
        }
    }

    /// First non-empty line with markdown heading/emphasis markers removed
    pub fn headline(&self) -> Option<String> {
        self.text
            .lines()
            .map(|line| line.trim().trim_start_matches('#').trim().trim_matches('*').trim())
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// Types of artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// First generated article
    Primary,

    /// Article rewritten by the improvement collaborator
    Improved,

    /// Translation of the accepted primary article
    Translation,
}

/// Count whitespace-delimited words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
