//! Generation Gateway
//!
//! A stateless request/response client for a text-generation backend. Every
//! call carries the complete conversation, since the backend keeps no memory
//! between calls.

use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Who authored a turn, from the backend's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Requester,
    Responder,
}

/// One entry of the ordered context handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub content: String,
}

impl ChatTurn {
    pub fn requester(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Requester,
            content: content.into(),
        }
    }

    pub fn responder(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Responder,
            content: content.into(),
        }
    }
}

/// Sampling parameters, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
        }
    }
}

/// A complete generation call: instructions first, then the ordered context.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub instructions: String,
    pub context: Vec<ChatTurn>,
    pub params: ModelParams,
}

/// A stateless completion function.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Produces the responder's next turn. Exactly one attempt is made.
    async fn complete(&self, request: GenerationRequest) -> Result<String>;
}

/// An implementation of `GenerationGateway` for any OpenAI-compatible API.
pub struct OpenAICompatibleGateway {
    client: Client<OpenAIConfig>,
}

impl OpenAICompatibleGateway {
    /// Creates a new gateway.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }
}

/// Maps a request onto the chat completions message list.
pub fn to_chat_messages(request: &GenerationRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(request.instructions.clone())
            .build()?
            .into(),
    ];
    for turn in &request.context {
        match turn.speaker {
            Speaker::Requester => messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
            ),
            Speaker::Responder => messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
            ),
        };
    }
    Ok(messages)
}

#[async_trait]
impl GenerationGateway for OpenAICompatibleGateway {
    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        let messages = to_chat_messages(&request)?;
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.params.model)
            .messages(messages)
            .temperature(request.params.temperature)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;
        let content = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .as_deref()
            .context("No content in LLM response")?
            .trim();

        if content.is_empty() {
            return Err(anyhow!("LLM returned an empty completion"));
        }
        Ok(content.to_string())
    }
}

/// Wraps a gateway so that every call has a bounded wait.
pub struct BoundedGateway {
    inner: Arc<dyn GenerationGateway>,
    timeout: Duration,
}

impl BoundedGateway {
    pub fn new(inner: Arc<dyn GenerationGateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl GenerationGateway for BoundedGateway {
    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        debug!(turns = request.context.len(), "Calling generation backend");
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "generation backend did not answer within {:?}",
                self.timeout
            )),
        }
    }
}
