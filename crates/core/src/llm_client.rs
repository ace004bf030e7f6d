use crate::history::{ChatMessage, ChatRole};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Represents the events that can be yielded from a streaming text response.
#[derive(Debug, Clone, PartialEq)]
pub enum LLMStreamEvent {
    TextChunk(String),
}

/// A stream of text chunks from the LLM.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMStreamEvent>> + Send>>;

/// Output shape requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFormat {
    Text,
    JsonObject,
}

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming completion call and returns the message content.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        format: CompletionFormat,
    ) -> Result<String>;

    /// Makes a token-streamed completion call.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<LLMStream>;
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    params: SamplingParams,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `params` - Model identifier and sampling parameters for chat completions.
    pub fn new(config: OpenAIConfig, params: SamplingParams) -> Self {
        Self {
            client: Client::with_config(config),
            params,
        }
    }

    fn request(
        &self,
        messages: Vec<ChatMessage>,
        format: CompletionFormat,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .into_iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.params.model)
            .messages(messages)
            .temperature(self.params.temperature)
            .max_completion_tokens(self.params.max_tokens)
            .stream(stream);
        if format == CompletionFormat::JsonObject {
            args.response_format(ResponseFormat::JsonObject);
        }
        Ok(args.build()?)
    }
}

fn to_request_message(message: ChatMessage) -> Result<ChatCompletionRequestMessage> {
    Ok(match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content)
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content)
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content)
            .build()?
            .into(),
    })
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        format: CompletionFormat,
    ) -> Result<String> {
        let request = self.request(messages, format, false)?;
        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .context("No response choice from LLM")?
            .message
            .content
            .context("No content in LLM response")
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<LLMStream> {
        let request = self.request(messages, CompletionFormat::Text, true)?;
        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async move {
            match result {
                Ok(response) => {
                    let content = response.choices.into_iter().next()?.delta.content?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(Ok(LLMStreamEvent::TextChunk(content)))
                    }
                }
                Err(e) => Some(Err(e.into())),
            }
        })))
    }
}
