//! Perplexity research adapter.
//!
//! Endpoint: POST /chat/completions (model `sonar`)
//! Auth: Bearer token

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ResearchOutput, Researcher};
use crate::core::json_extract::extract_json_object;
use crate::core::retry::CallError;

/// Perplexity API client
pub struct PerplexityClient {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ResearchRequest<'a> {
    model: &'a str,
    messages: Vec<ResearchMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ResearchMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResearchResponse {
    #[serde(default)]
    choices: Vec<ResearchChoice>,
}

#[derive(Debug, Deserialize)]
struct ResearchChoice {
    message: ResearchChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ResearchChoiceMessage {
    #[serde(default)]
    content: String,
}

impl PerplexityClient {
    pub fn new(endpoint: String, api_key: Option<String>, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            endpoint,
            api_key,
            model,
            client,
        }
    }
}

/// Research prompt for a category
pub fn research_prompt(category: &str) -> String {
    let focus = match category {
        "forex" => "the top 3 trending forex pairs today (current price, 24h change, volume insights, key drivers such as economic data, central bank policy and geopolitics), the most volatile pair and today's key economic events",
        "crypto" => "Bitcoin, Ethereum and one trending altcoin today (current price, market cap, 24h change, catalysts such as news, regulation and tech updates), overall market sentiment and major news",
        "commodities" => "the commodities moving today among gold, silver, oil and copper (current price, 24h change, supply/demand, geopolitical and economic drivers) and the most significant move",
        other => return format!(
            "Provide current {} market analysis: the most newsworthy instruments today with price, 24h change and key drivers. Include a JSON object with price, change and drivers.",
            other
        ),
    };
    format!(
        "Provide current market analysis covering {}. Include a JSON object with price, change and drivers for the most significant instrument.",
        focus
    )
}

/// Pull optional structured fields out of a research summary
fn structured_fields(summary: &str) -> (Option<String>, Option<String>, Option<String>) {
    let Some(value) = extract_json_object(summary).and_then(|s| serde_json::from_str::<Value>(s).ok()) else {
        return (None, None, None);
    };

    let field = |names: &[&str]| {
        names.iter().find_map(|name| match value.get(*name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        })
    };

    (
        field(&["price"]),
        field(&["change", "change_pct"]),
        field(&["drivers", "catalysts"]),
    )
}

#[async_trait]
impl Researcher for PerplexityClient {
    fn name(&self) -> &str {
        "perplexity"
    }

    async fn research(&self, category: &str) -> Result<ResearchOutput, CallError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CallError::Fatal("PERPLEXITY_API_KEY is not set".to_string()))?;

        let prompt = research_prompt(category);
        let body = ResearchRequest {
            model: &self.model,
            messages: vec![ResearchMessage {
                role: "user",
                content: &prompt,
            }],
        };

        debug!(%category, "Querying research API");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status.as_u16(), text));
        }

        let parsed: ResearchResponse = response.json().await?;
        let summary = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let (price, change, drivers) = structured_fields(&summary);

        Ok(ResearchOutput {
            success: !summary.trim().is_empty(),
            summary,
            price,
            change,
            drivers,
        })
    }
}
