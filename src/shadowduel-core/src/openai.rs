//! OpenAI-compatible chat completion provider.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::{DebateError, GenerationError};
use crate::generation::{
    GenerationParams, HistoryRole, Personas, ReplyGenerator, ReplyPrompt, finish_reply,
};
use crate::speaker::{Speaker, Turn};

/// Persona as the system message, own history as assistant turns and the
/// counterpart as user turns.
fn to_messages(prompt: ReplyPrompt) -> Vec<ChatCompletionRequestMessage> {
    let mut messages = Vec::with_capacity(prompt.history.len() + 1);
    messages.push(ChatCompletionRequestMessage::System(
        ChatCompletionRequestSystemMessage {
            content: prompt.persona.into(),
            name: None,
        },
    ));

    for entry in prompt.history {
        messages.push(match entry.role {
            HistoryRole::Own => {
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(entry.text.into()),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            HistoryRole::Other => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: entry.text.into(),
                    name: None,
                })
            }
        });
    }

    messages
}

/// Replies generated through any OpenAI-compatible endpoint.
pub struct OpenAIGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    personas: Personas,
    opening_prompt: String,
    params: GenerationParams,
}

impl OpenAIGenerator {
    pub fn new(
        config: &Config,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.generation.request_timeout())
            .connect_timeout(config.generation.connect_timeout())
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.into())
            .with_api_base(api_base.into());

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: config.generation.model().to_string(),
            personas: config.personas(),
            opening_prompt: config.opening_prompt(),
            params: config.generation.params(),
        })
    }
}

#[async_trait]
impl ReplyGenerator for OpenAIGenerator {
    async fn generate_reply(
        &self,
        transcript: &[Turn],
        speaker: Speaker,
    ) -> Result<Turn, GenerationError> {
        let prompt = ReplyPrompt::build(transcript, speaker, &self.personas, &self.opening_prompt);
        let messages = to_messages(prompt);
        debug!(%speaker, messages = messages.len(), model = %self.model, "sending chat completion request");

        // top_k has no equivalent in this API.
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(self.params.max_output_tokens)
            .temperature(self.params.temperature)
            .top_p(self.params.top_p)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(GenerationError::NoCandidates)?;

        finish_reply(&choice.message.content.unwrap_or_default(), speaker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::HistoryEntry;

    #[test]
    fn test_to_messages_roles() {
        let prompt = ReplyPrompt {
            persona: "persona".to_string(),
            history: vec![
                HistoryEntry {
                    role: HistoryRole::Other,
                    text: "opening".to_string(),
                },
                HistoryEntry {
                    role: HistoryRole::Own,
                    text: "reply".to_string(),
                },
            ],
        };

        let messages = to_messages(prompt);
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_new_uses_configured_model() {
        let mut config = crate::config::default_config();
        config.generation.provider = crate::config::GenerationProvider::OpenAI;
        let generator = OpenAIGenerator::new(&config, "http://localhost:1234/v1", "").unwrap();
        assert_eq!(generator.model, "gpt-4o-mini");
    }
}
