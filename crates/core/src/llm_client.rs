use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat, ResponseFormatJsonSchema,
    },
};
use tracing::debug;

/// Sampling settings for a single completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
        }
    }
}

/// A thin chat-completion client for any OpenAI-compatible API.
///
/// OpenAI and Gemini are both reached through this client; only the base URL
/// and key in the [`OpenAIConfig`] differ.
#[derive(Clone)]
pub struct ChatClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    fn messages(system: &str, user: &str) -> Result<Vec<ChatCompletionRequestMessage>> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user.to_string())
                .build()?
                .into(),
        ])
    }

    fn first_text(response: CreateChatCompletionResponse) -> Result<String> {
        let text = response
            .choices
            .into_iter()
            .next()
            .context("No response choice from LLM")?
            .message
            .content
            .context("No content in LLM response")?;
        Ok(text)
    }

    /// Makes a single, non-streaming completion and returns its text.
    pub async fn complete(&self, system: &str, user: &str, sampling: Sampling) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::messages(system, user)?)
            .temperature(sampling.temperature)
            .top_p(sampling.top_p)
            .build()?;

        debug!(model = %self.model, "Sending chat completion");
        let response = self.client.chat().create(request).await?;
        Self::first_text(response)
    }

    /// Makes a completion constrained to a JSON schema and returns the raw JSON text.
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::messages(system, user)?)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema_name.to_string(),
                    schema: Some(schema),
                    strict: None,
                },
            })
            .build()?;

        debug!(model = %self.model, schema = schema_name, "Sending structured chat completion");
        let response = self.client.chat().create(request).await?;
        Self::first_text(response)
    }
}
