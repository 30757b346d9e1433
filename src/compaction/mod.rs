//! Three-tier context compaction: a silent micro-compact that runs every
//! turn, a token-threshold auto-compact, and a manual compact triggered
//! by the `compact` tool using the same summarization procedure.
//!
//! Grounded 1:1 on `original_source/backend/app/compaction.py`
//! (`THRESHOLD=50000`, `KEEP_RECENT=3`, placeholder text, transcript
//! JSONL snapshot, two-message replacement), reconciled with the
//! teacher's `chat_engine/context.rs` for the chars/4 token-estimate
//! fallback shape.

use std::path::Path;

use anyhow::Result;

use crate::llm::LlmClient;
use crate::types::{ContentBlock, Message};

pub const THRESHOLD: usize = 50_000;
const KEEP_RECENT: usize = 3;
const SUMMARY_INPUT_LIMIT: usize = 80_000;

const SUMMARY_PROMPT: &str = "Summarize this conversation so it can be continued later. \
Include: 1) work already completed, 2) current state, 3) key decisions. \
Be concise but keep the essential details.\n\n";

/// Estimate the token count of `history`. Prefers the provider's own
/// counter; `LlmClient::get_num_tokens_from_messages` always returns
/// `None` in this crate (per spec §6c, the LLM boundary carries no
/// tokenizer), so this always falls through to the chars/4 estimate,
/// matching the original's `except NotImplementedError: pass` path.
pub fn estimate_tokens(history: &[Message], llm: Option<&LlmClient>) -> usize {
    if let Some(llm) = llm {
        if let Some(count) = llm.get_num_tokens_from_messages(history) {
            return count;
        }
    }
    history_debug_len(history) / 4
}

fn history_debug_len(history: &[Message]) -> usize {
    history.iter().map(|m| format!("{m:?}").len()).sum()
}

/// First tier: silently replace every `ToolResult` block's content, other
/// than the most recent `KEEP_RECENT`, with a short placeholder if it's
/// longer than 100 chars. Runs in place every turn; has no token
/// threshold of its own.
pub fn micro_compact(history: &mut [Message]) {
    let tool_result_positions: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| matches!(m, Message::ToolResult { .. }))
        .map(|(i, _)| i)
        .collect();

    if tool_result_positions.len() <= KEEP_RECENT {
        return;
    }

    let mut tool_names: std::collections::HashMap<String, String> = std::collections::HashMap::new();
    for m in history.iter() {
        if let Message::Assistant { content } = m {
            for block in content {
                if let ContentBlock::ToolCall(tc) = block {
                    tool_names.insert(tc.id.clone(), tc.name.clone());
                }
            }
        }
    }

    let cutoff = tool_result_positions.len() - KEEP_RECENT;
    for &idx in &tool_result_positions[..cutoff] {
        if let Message::ToolResult { content } = &mut history[idx] {
            for block in content.iter_mut() {
                if let ContentBlock::ToolResult { call_id, content: text } = block {
                    if text.len() > 100 {
                        let tool_name = tool_names.get(call_id).cloned().unwrap_or_else(|| "unknown".to_string());
                        *text = format!("[Previous: used {tool_name}]");
                    }
                }
            }
        }
    }
}

/// Second and third tiers: snapshot `history` to `transcript_path`, ask
/// the LLM for a three-point summary, and replace the whole history with
/// exactly two synthetic messages. Used both for the automatic
/// threshold-triggered compaction and the manual `compact` tool (the
/// original source uses the identical procedure for both).
pub async fn auto_compact(
    history: &[Message],
    llm: &LlmClient,
    transcript_path: &Path,
) -> Result<Vec<Message>> {
    write_transcript(history, transcript_path)?;

    let conversation_text = summarizable_text(history);
    let prompt = format!("{SUMMARY_PROMPT}{conversation_text}");
    let response = llm
        .chat("You are summarizing a conversation.", &[Message::user_text(prompt)], &[])
        .await?;
    let summary = response.text();

    Ok(vec![
        Message::user_text(format!(
            "[Conversation compressed. Transcript: {}]\n\n{summary}",
            transcript_path.display()
        )),
        Message::assistant_text("Understood. I've picked up the context from the summary and will continue."),
    ])
}

fn write_transcript(history: &[Message], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for m in history {
        let role = message_role(m);
        out.push_str(&serde_json::to_string(&serde_json::json!({
            "role": role,
            "content": m.text(),
        }))?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

fn message_role(m: &Message) -> &'static str {
    match m {
        Message::User { .. } => "user",
        Message::Assistant { .. } => "assistant",
        Message::ToolResult { .. } => "tool",
        Message::System { .. } => "system",
    }
}

fn summarizable_text(history: &[Message]) -> String {
    let mut out = String::new();
    for m in history {
        let mut text = m.text();
        if text.len() > 500 {
            text.truncate(500);
        }
        out.push_str(&format!("{}: {}\n", message_role(m), text));
    }
    out.chars().take(SUMMARY_INPUT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolCall, ToolResult};

    fn tool_result_msg(call_id: &str, content: &str) -> Message {
        Message::tool_result_for(vec![ToolResult::ok(call_id, content)])
    }

    fn assistant_with_call(call_id: &str, name: &str) -> Message {
        Message::Assistant {
            content: vec![ContentBlock::ToolCall(ToolCall {
                id: call_id.to_string(),
                name: name.to_string(),
                args: serde_json::json!({}),
            })],
        }
    }

    #[test]
    fn micro_compact_leaves_recent_three_untouched() {
        let long = "x".repeat(200);
        let mut history = vec![
            assistant_with_call("a", "Read"),
            tool_result_msg("a", &long),
            assistant_with_call("b", "Read"),
            tool_result_msg("b", &long),
            assistant_with_call("c", "Read"),
            tool_result_msg("c", &long),
            assistant_with_call("d", "Read"),
            tool_result_msg("d", &long),
        ];
        micro_compact(&mut history);

        let Message::ToolResult { content } = &history[1] else { panic!() };
        let ContentBlock::ToolResult { content: text, .. } = &content[0] else { panic!() };
        assert_eq!(text, "[Previous: used Read]");

        let Message::ToolResult { content } = &history[7] else { panic!() };
        let ContentBlock::ToolResult { content: text, .. } = &content[0] else { panic!() };
        assert_eq!(text, &long);
    }

    #[test]
    fn micro_compact_is_noop_under_keep_recent() {
        let mut history = vec![
            assistant_with_call("a", "Read"),
            tool_result_msg("a", &"x".repeat(200)),
        ];
        let before = format!("{history:?}");
        micro_compact(&mut history);
        assert_eq!(format!("{history:?}"), before);
    }

    #[test]
    fn micro_compact_skips_short_results() {
        let mut history = vec![
            assistant_with_call("a", "Read"),
            tool_result_msg("a", "short"),
            assistant_with_call("b", "Read"),
            tool_result_msg("b", "short"),
            assistant_with_call("c", "Read"),
            tool_result_msg("c", "short"),
            assistant_with_call("d", "Read"),
            tool_result_msg("d", "short"),
        ];
        micro_compact(&mut history);
        let Message::ToolResult { content } = &history[1] else { panic!() };
        let ContentBlock::ToolResult { content: text, .. } = &content[0] else { panic!() };
        assert_eq!(text, "short");
    }

    #[test]
    fn estimate_tokens_falls_back_to_chars_over_four() {
        let history = vec![Message::user_text("a".repeat(400))];
        let estimate = estimate_tokens(&history, None);
        assert!(estimate > 0);
    }
}
