use serde::{ Serialize, Deserialize };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Body accepted by the chat endpoint. Either `messages` or the legacy
/// `systemInstruction` + `prompt` pair.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(
        default,
        rename = "systemInstruction",
        skip_serializing_if = "Option::is_none"
    )]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl ChatRequest {
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages: Some(messages), ..Default::default() }
    }

    /// Resolves the conversation to send upstream. An explicit `messages`
    /// array always wins; otherwise both legacy fields must be non-empty.
    pub fn conversation(&self) -> Option<Vec<ChatMessage>> {
        if let Some(messages) = &self.messages {
            return Some(messages.clone());
        }
        match (self.system_instruction.as_deref(), self.prompt.as_deref()) {
            (Some(system), Some(prompt)) if !system.is_empty() && !prompt.is_empty() => {
                Some(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            }
            _ => None,
        }
    }
}
