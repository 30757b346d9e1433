//! Anthropic Messages API client, grounded on the teacher's
//! `webui/anthropic/client/{mod,request}.rs`: same auth-header resolution,
//! same beta-header conventions, same non-streaming JSON body shape.
//! Streaming (SSE) is the teacher's concern for a chat UI; this runtime
//! only needs the one-shot request/response `chat` contract spec §6 names.

use super::credentials;
use super::{ChatResponse, ToolSpec};
use crate::types::{ContentBlock, Message, ToolCall};
use anyhow::{Context, Result};
use serde_json::json;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicClient {
    pub model: String,
}

impl AnthropicClient {
    pub fn new(model: String) -> Self {
        AnthropicClient { model }
    }

    pub async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ChatResponse> {
        let creds = credentials::resolve()?;
        let is_oauth = matches!(creds, credentials::Credentials::OAuth { .. });
        let (auth_header_name, auth_header_value) = credentials::get_auth_header(&creds).await?;

        let mut body = json!({
            "model": self.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "system": system,
            "messages": to_wire_messages(messages),
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools
                .iter()
                .map(|t| json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                }))
                .collect::<Vec<_>>());
        }
        if is_oauth {
            if let Some(o) = body.as_object_mut() {
                o.remove("temperature");
                o.remove("tool_choice");
            }
        }

        let url = if is_oauth {
            "https://api.anthropic.com/v1/messages?beta=true"
        } else {
            "https://api.anthropic.com/v1/messages"
        };

        let client = reqwest::Client::new();
        let mut req = client
            .post(url)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .header(auth_header_name, &auth_header_value);
        if is_oauth {
            req = req.header("anthropic-beta", "oauth-2025-04-20");
        }

        let response = req.json(&body).send().await.context("Sending Anthropic API request")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({status}): {text}");
        }

        let value: serde_json::Value = response.json().await.context("Parsing Anthropic response")?;
        parse_response(&value)
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| match m {
            Message::User { content } => json!({"role": "user", "content": blocks_to_wire(content)}),
            Message::Assistant { content } => {
                json!({"role": "assistant", "content": blocks_to_wire(content)})
            }
            Message::ToolResult { content } => {
                json!({"role": "user", "content": blocks_to_wire(content)})
            }
            Message::System { content } => {
                json!({"role": "user", "content": blocks_to_wire(content)})
            }
        })
        .collect()
}

fn blocks_to_wire(blocks: &[ContentBlock]) -> Vec<serde_json::Value> {
    blocks
        .iter()
        .map(|b| match b {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::ToolCall(tc) => json!({
                "type": "tool_use", "id": tc.id, "name": tc.name, "input": tc.args,
            }),
            ContentBlock::ToolResult { call_id, content } => json!({
                "type": "tool_result", "tool_use_id": call_id, "content": content,
            }),
        })
        .collect()
}

fn parse_response(value: &serde_json::Value) -> Result<ChatResponse> {
    let stop_reason = value
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("end_turn")
        .to_string();

    let mut content = Vec::new();
    if let Some(blocks) = value.get("content").and_then(|v| v.as_array()) {
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        content.push(ContentBlock::Text { text: text.to_string() });
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    let args = block.get("input").cloned().unwrap_or(json!({}));
                    content.push(ContentBlock::ToolCall(ToolCall { id, name, args }));
                }
                _ => {}
            }
        }
    }
    if content.is_empty() {
        content.push(ContentBlock::Text { text: String::new() });
    }

    Ok(ChatResponse { content, stop_reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_extracts_text_and_tool_use() {
        let value = json!({
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "call_1", "name": "bash", "input": {"command": "ls"}},
            ],
        });
        let resp = parse_response(&value).unwrap();
        assert_eq!(resp.stop_reason, "tool_use");
        assert_eq!(resp.text(), "Let me check.");
        assert!(resp.has_tool_calls());
    }

    #[test]
    fn parse_response_with_no_content_yields_empty_text_block() {
        let value = json!({"stop_reason": "end_turn", "content": []});
        let resp = parse_response(&value).unwrap();
        assert_eq!(resp.text(), "");
        assert!(!resp.has_tool_calls());
    }
}
