//! In-app help chat: the user's conversation is forwarded to the model behind a fixed
//! system prompt describing the app.

use crate::domain::validation::ValidationError;
use crate::llm::{prompts, ChatRole, ChatTurn, GenerateRequest, Generation, LlmClient};
use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const MAX_TURNS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct SupportChatRequest {
    pub messages: Vec<ChatTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportReply {
    pub message: String,
}

/// Splits a conversation into earlier turns and the user message being answered.
fn split_conversation(
    mut messages: Vec<ChatTurn>,
) -> Result<(Vec<ChatTurn>, String), ValidationError> {
    if messages.len() > MAX_TURNS {
        return Err(ValidationError::new(
            "messages",
            format!("at most {MAX_TURNS} messages are allowed"),
        ));
    }
    if messages.iter().any(|m| m.content.trim().is_empty()) {
        return Err(ValidationError::new("messages", "messages must not be empty"));
    }
    match messages.pop() {
        Some(ChatTurn {
            role: ChatRole::User,
            content,
        }) => Ok((messages, content)),
        Some(_) => Err(ValidationError::new(
            "messages",
            "the last message must come from the user",
        )),
        None => Err(ValidationError::new("messages", "at least one message is required")),
    }
}

pub async fn support_reply(
    llm: &dyn LlmClient,
    request: SupportChatRequest,
) -> anyhow::Result<SupportReply> {
    let (history, latest) = split_conversation(request.messages)?;
    let turns = history.len() + 1;

    let generation = llm
        .generate(GenerateRequest::text(prompts::support_system_prompt(), latest).with_history(history))
        .await
        .context("support chat call failed")?;

    match generation {
        Generation::Text(message) => {
            tracing::info!(turns, reply_chars = message.len(), "support chat answered");
            Ok(SupportReply { message })
        }
        Generation::ToolCall { name, .. } => {
            anyhow::bail!("support chat expected a text reply, got tool call {name}")
        }
    }
}
