//! Gemini `generateContent` provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{DebateError, GenerationError};
use crate::generation::{
    GenerationParams, HistoryRole, Personas, ReplyGenerator, ReplyPrompt, finish_reply,
};
use crate::speaker::{Speaker, Turn};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentRequest {
    /// The persona goes first as a user turn; own history is `model`,
    /// everything else `user`.
    fn from_prompt(prompt: ReplyPrompt, params: GenerationParams) -> Self {
        let mut contents = Vec::with_capacity(prompt.history.len() + 1);
        contents.push(Content::text("user", prompt.persona));
        contents.extend(prompt.history.into_iter().map(|entry| {
            let role = match entry.role {
                HistoryRole::Own => "model",
                HistoryRole::Other => "user",
            };
            Content::text(role, entry.text)
        }));

        Self {
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                max_output_tokens: params.max_output_tokens,
            },
        }
    }
}

impl Content {
    fn text(role: &str, text: String) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part { text: Some(text) }],
        }
    }
}

/// First part of the first candidate, or the matching error.
fn extract_text(response: GenerateContentResponse) -> Result<String, GenerationError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GenerationError::NoCandidates)?;

    Ok(candidate
        .content
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .unwrap_or_default())
}

/// `error.message` from a Gemini error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Replies generated by a Gemini model.
pub struct GeminiGenerator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    personas: Personas,
    opening_prompt: String,
    params: GenerationParams,
}

impl GeminiGenerator {
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self, DebateError> {
        let http = reqwest::Client::builder()
            .timeout(config.generation.request_timeout())
            .connect_timeout(config.generation.connect_timeout())
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.generation.api_base().trim_end_matches('/'),
                config.generation.model()
            ),
            api_key: api_key.into(),
            personas: config.personas(),
            opening_prompt: config.opening_prompt(),
            params: config.generation.params(),
        })
    }
}

#[async_trait]
impl ReplyGenerator for GeminiGenerator {
    async fn generate_reply(
        &self,
        transcript: &[Turn],
        speaker: Speaker,
    ) -> Result<Turn, GenerationError> {
        let prompt = ReplyPrompt::build(transcript, speaker, &self.personas, &self.opening_prompt);
        let request = GenerateContentRequest::from_prompt(prompt, self.params);
        debug!(
            %speaker,
            contents = request.contents.len(),
            "sending Gemini generateContent request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }

        let body: GenerateContentResponse = response.json().await?;
        let text = extract_text(body)?;
        finish_reply(&text, speaker)
    }
}
