//! DeepSeek client, grounded on `original_source/backend/app/llm.py`'s
//! `ChatOpenAI(model=DEEPSEEK_MODEL, api_key=DEEPSEEK_API_KEY,
//! base_url=DEEPSEEK_BASE_URL)`: an OpenAI-compatible chat-completions
//! call, reimplemented directly over `reqwest` rather than pulling in an
//! OpenAI SDK the rest of the crate has no other use for.

use super::{ChatResponse, ToolSpec};
use crate::types::{ContentBlock, Message, ToolCall};
use anyhow::{Context, Result};
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

pub struct DeepSeekClient {
    pub model: String,
    api_key: String,
    base_url: String,
}

impl DeepSeekClient {
    pub fn from_env(model: String) -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .context("DEEPSEEK_API_KEY is not set")?;
        let base_url = std::env::var("DEEPSEEK_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(DeepSeekClient { model, api_key, base_url })
    }

    pub async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ChatResponse> {
        let mut wire_messages = vec![json!({"role": "system", "content": system})];
        wire_messages.extend(to_wire_messages(messages));

        let mut body = json!({
            "model": self.model,
            "messages": wire_messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools
                .iter()
                .map(|t| json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    },
                }))
                .collect::<Vec<_>>());
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let client = reqwest::Client::new();
        let response = client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Sending DeepSeek API request")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("DeepSeek API error ({status}): {text}");
        }

        let value: serde_json::Value = response.json().await.context("Parsing DeepSeek response")?;
        parse_response(&value)
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    for m in messages {
        match m {
            Message::User { content } => out.push(json!({
                "role": "user",
                "content": text_of(content),
            })),
            Message::System { content } => out.push(json!({
                "role": "user",
                "content": text_of(content),
            })),
            Message::Assistant { content } => {
                let text = text_of(content);
                let tool_calls: Vec<serde_json::Value> = content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolCall(tc) => Some(json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {"name": tc.name, "arguments": tc.args.to_string()},
                        })),
                        _ => None,
                    })
                    .collect();
                let mut msg = json!({"role": "assistant", "content": text});
                if !tool_calls.is_empty() {
                    msg["tool_calls"] = json!(tool_calls);
                }
                out.push(msg);
            }
            Message::ToolResult { content } => {
                for block in content {
                    if let ContentBlock::ToolResult { call_id, content } = block {
                        out.push(json!({
                            "role": "tool",
                            "tool_call_id": call_id,
                            "content": content,
                        }));
                    }
                }
            }
        }
    }
    out
}

fn text_of(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn parse_response(value: &serde_json::Value) -> Result<ChatResponse> {
    let choice = value
        .pointer("/choices/0")
        .context("DeepSeek response had no choices")?;
    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("stop")
        .to_string();
    let message = choice.get("message").context("choice had no message")?;

    let mut content = Vec::new();
    if let Some(text) = message.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text: text.to_string() });
        }
    }
    if let Some(tool_calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tool_calls {
            let id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let function = tc.get("function").cloned().unwrap_or(json!({}));
            let name = function.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let args: serde_json::Value = function
                .get("arguments")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or(json!({}));
            content.push(ContentBlock::ToolCall(ToolCall { id, name, args }));
        }
    }
    if content.is_empty() {
        content.push(ContentBlock::Text { text: String::new() });
    }

    let stop_reason = if finish_reason == "tool_calls" {
        "tool_use".to_string()
    } else {
        "end_turn".to_string()
    };

    Ok(ChatResponse { content, stop_reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_maps_tool_calls_finish_reason() {
        let value = json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "bash", "arguments": "{\"command\":\"ls\"}"},
                    }],
                },
            }],
        });
        let resp = parse_response(&value).unwrap();
        assert_eq!(resp.stop_reason, "tool_use");
        assert!(resp.has_tool_calls());
    }

    #[test]
    fn parse_response_plain_text_has_end_turn_stop_reason() {
        let value = json!({
            "choices": [{"finish_reason": "stop", "message": {"content": "hi there"}}],
        });
        let resp = parse_response(&value).unwrap();
        assert_eq!(resp.stop_reason, "end_turn");
        assert_eq!(resp.text(), "hi there");
    }
}
