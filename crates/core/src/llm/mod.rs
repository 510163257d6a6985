use serde::{Deserialize, Serialize};

pub mod error;
pub mod gateway;
pub mod json;
pub mod prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gateway,
    #[cfg(test)]
    Scripted,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gateway => "gateway",
            #[cfg(test)]
            Provider::Scripted => "scripted",
        }
    }
}

/// Function schema the model is forced to call, for schema-constrained output.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One earlier message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system: String,
    /// Turns sent between the system prompt and `user`, oldest first.
    pub history: Vec<ChatTurn>,
    pub user: String,
    pub image: Option<InlineImage>,
    pub tool: Option<ToolSpec>,
}

impl GenerateRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            history: Vec::new(),
            user: user.into(),
            image: None,
            tool: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, request: GenerateRequest) -> anyhow::Result<Generation>;
}
