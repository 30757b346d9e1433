//! LLM capability boundary: a request/response `chat` call plus an
//! optional token counter, per spec §6's external-interface contract.
//! The LLM itself is explicitly out of scope for design — this module is
//! a thin, well-understood wrapper, not a place for orchestration logic.
//!
//! Two providers, grounded respectively on the teacher's
//! `webui/anthropic/client` (Anthropic Messages API) and
//! `original_source/backend/app/llm.py`'s `ChatOpenAI(DEEPSEEK_*)`
//! (OpenAI-compatible chat completions).

pub mod anthropic;
pub mod credentials;
pub mod deepseek;

use crate::config::{Config, Provider};
use crate::types::{ContentBlock, Message};
use anyhow::Result;

/// A tool the LLM may call, in provider-agnostic form.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// The assistant's reply to one `chat` call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: String,
}

impl ChatResponse {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolCall(_)))
    }
}

/// Dispatches to whichever provider the runtime is configured with.
/// An enum rather than a trait object: there are exactly two providers
/// and neither needs to be swapped at a seam other than startup.
pub enum LlmClient {
    Anthropic(anthropic::AnthropicClient),
    DeepSeek(deepseek::DeepSeekClient),
}

impl LlmClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.provider {
            Provider::Anthropic => Ok(LlmClient::Anthropic(anthropic::AnthropicClient::new(
                config.model.clone(),
            ))),
            Provider::DeepSeek => Ok(LlmClient::DeepSeek(deepseek::DeepSeekClient::from_env(
                config.model.clone(),
            )?)),
        }
    }

    pub async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ChatResponse> {
        match self {
            LlmClient::Anthropic(c) => c.chat(system, messages, tools).await,
            LlmClient::DeepSeek(c) => c.chat(system, messages, tools).await,
        }
    }

    /// Precise token count when the provider's SDK exposes a tokenizer.
    /// Returning `None` falls back to compaction's 4-chars-per-token
    /// estimate, matching `estimate_tokens`'s `NotImplementedError` path.
    pub fn get_num_tokens_from_messages(&self, _messages: &[Message]) -> Option<usize> {
        None
    }

    pub fn model(&self) -> &str {
        match self {
            LlmClient::Anthropic(c) => &c.model,
            LlmClient::DeepSeek(c) => &c.model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_text_concatenates_text_blocks_only() {
        let resp = ChatResponse {
            content: vec![
                ContentBlock::Text { text: "a".into() },
                ContentBlock::ToolCall(crate::types::ToolCall {
                    id: "1".into(),
                    name: "bash".into(),
                    args: serde_json::json!({}),
                }),
                ContentBlock::Text { text: "b".into() },
            ],
            stop_reason: "tool_use".into(),
        };
        assert_eq!(resp.text(), "ab");
        assert!(resp.has_tool_calls());
    }
}
