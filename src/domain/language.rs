//! Target languages.

use serde::{Deserialize, Serialize};

/// A language the pipeline produces content in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Stable key used in prompts and logs (e.g. "arabic_gcc")
    pub key: String,

    /// Code used in the delivery payload (e.g. "ar")
    pub code: String,

    /// Display name (e.g. "Arabic (Gulf)")
    pub name: String,

    /// Writing system expected in the output
    #[serde(default)]
    pub script: Script,

    /// Right-to-left rendering
    #[serde(default)]
    pub rtl: bool,
}

/// Writing systems with a local output check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    #[default]
    Latin,
    Arabic,
}

impl Script {
    /// Whether `text` contains at least one character of this script.
    ///
    /// Latin is not checked and always passes.
    pub fn is_present_in(self, text: &str) -> bool {
        match self {
            Script::Latin => true,
            Script::Arabic => text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)),
        }
    }
}

impl Language {
    fn make(key: &str, code: &str, name: &str, script: Script, rtl: bool) -> Self {
        Self {
            key: key.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            script,
            rtl,
        }
    }

    /// The primary (source) language
    pub fn english() -> Self {
        Self::make("english", "en", "English", Script::Latin, false)
    }

    pub fn arabic_gcc() -> Self {
        Self::make("arabic_gcc", "ar", "Arabic (Gulf)", Script::Arabic, true)
    }

    pub fn spanish() -> Self {
        Self::make("spanish", "es", "Spanish", Script::Latin, false)
    }

    pub fn portuguese() -> Self {
        Self::make("portuguese", "pt-BR", "Portuguese (Brazil)", Script::Latin, false)
    }

    /// Default translation targets
    pub fn default_targets() -> Vec<Self> {
        vec![Self::arabic_gcc(), Self::spanish(), Self::portuguese()]
    }
}
