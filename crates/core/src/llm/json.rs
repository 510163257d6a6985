use crate::llm::Generation;
use anyhow::Context;
use serde::de::DeserializeOwned;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        } else {
            inner = inner.trim_start_matches('`').trim_start_matches("json");
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_text<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    serde_json::from_str::<T>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for the expected schema: {json_str}"))
}

/// Decodes a generation, preferring the forced tool call and falling back to fenced text.
pub fn parse_generation<T: DeserializeOwned>(
    generation: &Generation,
    tool_name: &str,
) -> anyhow::Result<T> {
    match generation {
        Generation::ToolCall { .. } => parse_tool_call(generation, tool_name),
        Generation::Text(text) => parse_text(text),
    }
}

/// Decodes a generation that must be a call to `tool_name`. Plain text is rejected even when
/// it happens to hold JSON.
pub fn parse_tool_call<T: DeserializeOwned>(
    generation: &Generation,
    tool_name: &str,
) -> anyhow::Result<T> {
    let Generation::ToolCall { name, arguments } = generation else {
        anyhow::bail!("no tool call in model response (expected {tool_name})");
    };
    anyhow::ensure!(
        name == tool_name,
        "unexpected tool call: expected {tool_name}, got {name}"
    );
    // Some gateways return arguments as a JSON-encoded string.
    if let serde_json::Value::String(raw) = arguments {
        return parse_text(raw);
    }
    serde_json::from_value::<T>(arguments.clone())
        .with_context(|| format!("failed to decode {tool_name} arguments: {arguments}"))
}
