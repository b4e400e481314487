//! Azure OpenAI chat-completions adapter.
//!
//! Endpoint: POST {endpoint}openai/deployments/{deployment}/chat/completions
//! Auth: `api-key` header

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationOutput, GenerationRequest, Generator, TokenUsage};
use crate::core::retry::CallError;

const SYSTEM_PROMPT: &str = "You are a professional forex, crypto and commodities market writer for a regulated broker. Never promise profits.";

/// Azure OpenAI client
pub struct AzureOpenAiClient {
    endpoint: String,
    api_key: Option<String>,
    api_version: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    /// Create a new client
    pub fn new(endpoint: String, api_key: Option<String>, api_version: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            endpoint,
            api_key,
            api_version,
            client,
        }
    }

    /// Build the completions URL for a deployment
    fn completions_url(&self, deployment: &str) -> String {
        let base = if self.endpoint.ends_with('/') {
            self.endpoint.clone()
        } else {
            format!("{}/", self.endpoint)
        };
        format!(
            "{}openai/deployments/{}/chat/completions?api-version={}",
            base, deployment, self.api_version
        )
    }
}

#[async_trait]
impl Generator for AzureOpenAiClient {
    fn name(&self) -> &str {
        "azure-openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, CallError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CallError::Fatal("AZURE_OPENAI_KEY is not set".to_string()))?;

        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_completion_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(deployment = %request.deployment, "Sending chat completion");

        let response = self
            .client
            .post(self.completions_url(&request.deployment))
            .header("api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status.as_u16(), text));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(CallError::EmptyResponse(format!(
                "azure-openai/{}",
                request.deployment
            )));
        }

        Ok(GenerationOutput {
            content,
            usage: parsed.usage,
        })
    }
}
