use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client as AsyncOpenAiClient};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::CompletionError;
use crate::session::{ChatMessage, Role};

pub type SharedLlmClient = Arc<dyn LlmClient>;

/// One chat-completion call: the model, the ordered context, and the output cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u16,
}

/// Boundary to the hosted completion service. Replies come back already
/// normalized into an assistant `ChatMessage`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<ChatMessage, CompletionError>;
}

/// Runs one completion, failing with `CompletionError::Timeout` once `timeout` elapses.
pub async fn complete_with_timeout(
    client: &dyn LlmClient,
    request: CompletionRequest,
    timeout: Option<Duration>,
) -> Result<ChatMessage, CompletionError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, client.complete(request))
            .await
            .map_err(|_| CompletionError::Timeout(limit))?,
        None => client.complete(request).await,
    }
}

/// Maps raw reply text into the stored message shape.
pub fn normalize_reply(content: Option<String>) -> Result<ChatMessage, CompletionError> {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(ChatMessage::assistant(text)),
        _ => Err(CompletionError::EmptyReply),
    }
}

/// Offline stand-in that answers without a network call.
#[derive(Debug, Default, Clone)]
pub struct EchoLlmClient;

#[async_trait]
impl LlmClient for EchoLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<ChatMessage, CompletionError> {
        let last = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let preview: String = last.chars().take(200).collect();

        Ok(ChatMessage::assistant(format!(
            "[offline reply] {} messages in context. You said: {preview}",
            request.messages.len()
        )))
    }
}

impl EchoLlmClient {
    pub fn shared() -> SharedLlmClient {
        Arc::new(Self)
    }
}

/// OpenAI-compatible client that can point at OpenAI, vLLM, or any HTTP-compatible backend.
pub struct OpenAiLlmClient {
    client: AsyncOpenAiClient<OpenAIConfig>,
}

impl OpenAiLlmClient {
    pub fn shared_from_env() -> anyhow::Result<SharedLlmClient> {
        let config = Self::build_config_from_env()?;
        Ok(Arc::new(Self {
            client: AsyncOpenAiClient::with_config(config),
        }))
    }

    fn build_config_from_env() -> anyhow::Result<OpenAIConfig> {
        let api_key = env::var("OPENAI_API_KEY")
            .or_else(|_| env::var("DOCCHAT_OPENAI_API_KEY"))
            .context("Set OPENAI_API_KEY (or DOCCHAT_OPENAI_API_KEY) to use the OpenAI client")?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);

        if let Ok(base_url) =
            env::var("OPENAI_BASE_URL").or_else(|_| env::var("DOCCHAT_OPENAI_BASE_URL"))
        {
            config = config.with_api_base(base_url);
        }

        Ok(config)
    }

    fn to_request_message(message: &ChatMessage) -> anyhow::Result<ChatCompletionRequestMessage> {
        let content = message.content.as_str();
        let converted = match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()?
                .into(),
        };
        Ok(converted)
    }

    #[instrument(level = "debug", skip_all, fields(model = %request.model, messages = request.messages.len()))]
    async fn chat(&self, request: &CompletionRequest) -> anyhow::Result<Option<String>> {
        let messages = request
            .messages
            .iter()
            .map(Self::to_request_message)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let body = CreateChatCompletionRequestArgs::default()
            .model(request.model.as_str())
            .max_tokens(request.max_tokens)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(body).await?;
        let choice = response
            .choices
            .first()
            .context("LLM response did not contain any choices")?;

        Ok(choice.message.content.clone())
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<ChatMessage, CompletionError> {
        let content = self
            .chat(&request)
            .await
            .map_err(CompletionError::Service)?;
        normalize_reply(content)
    }
}

/// Picks the echo client when `offline` is set, otherwise the OpenAI-compatible client from env.
pub fn build_llm_client_from_env(offline: bool) -> anyhow::Result<SharedLlmClient> {
    if offline {
        info!("Offline mode: replies come from EchoLlmClient");
        return Ok(EchoLlmClient::shared());
    }
    OpenAiLlmClient::shared_from_env()
}
