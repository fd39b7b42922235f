//! Integration with Large Language Model services.
//!
//! This module provides a thin wrapper around the OpenAI chat completions API
//! for streaming answers to a thread transcript.

use std::sync::Arc;

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse, FinishReason,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{info, instrument};

use crate::base::{
    config::Config,
    error::CompletionError,
    types::{ModelConfig, Role, StreamDelta, Transcript},
};

use super::{CompletionStream, GenericLlmClient, LlmClient};

// Extra methods on `LlmClient` applied by the openai implementation.

impl LlmClient {
    pub fn openai(config: &Config) -> Self {
        let client = OpenAiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// OpenAI LLM client implementation.
#[derive(Clone)]
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiLlmClient {
    /// Create a new OpenAI LLM client.
    #[instrument(name = "OpenAiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Self { client: Client::with_config(cfg) }
    }
}

#[async_trait]
impl GenericLlmClient for OpenAiLlmClient {
    #[instrument(name = "OpenAiLlmClient::stream_completion", skip_all, fields(model = %model.model, turns = transcript.len()))]
    async fn stream_completion(&self, transcript: &Transcript, model: &ModelConfig) -> Result<CompletionStream, CompletionError> {
        let messages = build_messages(transcript, model).map_err(unavailable)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&model.model)
            .messages(messages)
            .temperature(model.temperature)
            .stream(true)
            .build()
            .map_err(unavailable)?;

        let stream = self.client.chat().create_stream(request).await.map_err(unavailable)?;

        info!("Opened OpenAI completion stream.");

        let deltas = stream.map(|chunk| chunk.map(into_delta).map_err(|err| CompletionError::Stream(err.to_string())));

        Ok(CompletionStream::new(deltas))
    }
}

/// Map the transcript onto chat completion request messages.
pub fn build_messages(transcript: &Transcript, model: &ModelConfig) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);

    if let Some(directive) = &model.system_directive {
        messages.push(ChatCompletionRequestSystemMessageArgs::default().content(directive.as_str()).build()?.into());
    }

    for entry in transcript.entries() {
        let message = match entry.role() {
            Role::System => ChatCompletionRequestSystemMessageArgs::default().content(entry.content()).build()?.into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default().content(entry.content()).build()?.into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default().content(entry.content()).build()?.into(),
        };

        messages.push(message);
    }

    Ok(messages)
}

/// Convert one streamed chunk into a delta; only the first choice is used.
pub fn into_delta(chunk: CreateChatCompletionStreamResponse) -> StreamDelta {
    let Some(choice) = chunk.choices.into_iter().next() else {
        return StreamDelta::default();
    };

    StreamDelta {
        text: choice.delta.content.filter(|content| !content.is_empty()),
        finish_reason: choice.finish_reason.map(finish_reason_name),
    }
}

fn finish_reason_name(reason: FinishReason) -> String {
    serde_json::to_value(&reason)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{reason:?}"))
}

fn unavailable(err: OpenAIError) -> CompletionError {
    CompletionError::Unavailable(err.to_string())
}

// Tests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::base::types::ChatEntry;

    fn model(system_directive: Option<&str>) -> ModelConfig {
        ModelConfig {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 1.0,
            system_directive: system_directive.map(str::to_string),
        }
    }

    fn chunk(content: Option<&str>, finish_reason: Option<&str>) -> CreateChatCompletionStreamResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "delta": { "content": content },
                "finish_reason": finish_reason,
            }],
        }))
        .unwrap()
    }

    #[test]
    fn maps_transcript_roles_in_order() {
        let mut transcript = Transcript::default();
        transcript.push(ChatEntry::new(Role::User, "hello"));
        transcript.push(ChatEntry::new(Role::Assistant, "hi there"));

        let messages = build_messages(&transcript, &model(Some("Be brief."))).unwrap();
        let value = serde_json::to_value(&messages).unwrap();

        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[0]["content"], "Be brief.");
        assert_eq!(value[1]["role"], "user");
        assert_eq!(value[1]["content"], "hello");
        assert_eq!(value[2]["role"], "assistant");
        assert_eq!(value[2]["content"], "hi there");
    }

    #[test]
    fn omits_system_turn_without_directive() {
        let mut transcript = Transcript::default();
        transcript.push(ChatEntry::new(Role::User, "hello"));

        let messages = build_messages(&transcript, &model(None)).unwrap();

        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn chunk_with_content_becomes_text_delta() {
        assert_eq!(into_delta(chunk(Some("Hel"), None)), StreamDelta::text("Hel"));
    }

    #[test]
    fn chunk_with_finish_reason_becomes_terminal_delta() {
        assert_eq!(into_delta(chunk(None, Some("stop"))), StreamDelta::finish("stop"));
        assert_eq!(into_delta(chunk(None, Some("length"))), StreamDelta::finish("length"));
    }

    #[test]
    fn role_only_chunk_is_a_skip() {
        assert_eq!(into_delta(chunk(Some(""), None)), StreamDelta::default());
        assert_eq!(into_delta(chunk(None, None)), StreamDelta::default());
    }
}
