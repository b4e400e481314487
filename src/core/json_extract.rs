//! Structured-payload extraction from free-form model output.
//!
//! Scorers and the SEO generator are asked for JSON, but answers arrive
//! wrapped in prose or markdown fences. Extraction order:
//! 1. A ```json fenced block
//! 2. The first balanced `{...}` object (string and escape aware)

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Extraction or decoding failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("no JSON object found in response starting with '{preview}'")]
    NotFound { preview: String },

    #[error("JSON object appears truncated ({unclosed} unclosed braces)")]
    Truncated { unclosed: usize },

    #[error("invalid JSON payload: {0}")]
    Invalid(String),
}

/// Find the first complete JSON object in `content`
pub fn extract_json_object(content: &str) -> Option<&str> {
    locate(content).ok()
}

/// Extract and decode the embedded object
pub fn parse_embedded<T: DeserializeOwned>(content: &str) -> Result<T, ExtractError> {
    let raw = locate(content)?;
    serde_json::from_str(raw).map_err(|e| ExtractError::Invalid(e.to_string()))
}

fn locate(content: &str) -> Result<&str, ExtractError> {
    if let Some(fenced) = fenced_block(content) {
        if let Ok(object) = balanced_object(fenced) {
            return Ok(object);
        }
    }
    balanced_object(content)
}

/// Body of the first ```json fence, if any
fn fenced_block(content: &str) -> Option<&str> {
    let start = content.find("```json")? + "```json".len();
    let rest = &content[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn balanced_object(content: &str) -> Result<&str, ExtractError> {
    let Some(start) = content.find('{') else {
        let preview: String = content.trim().chars().take(50).collect();
        return Err(ExtractError::NotFound { preview });
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Ok(&content[start..end]);
                }
            }
            _ => {}
        }
    }

    Err(ExtractError::Truncated { unclosed: depth })
}
