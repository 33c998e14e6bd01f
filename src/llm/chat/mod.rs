pub mod mistral;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use self::mistral::MistralChatClient;
use super::LlmConfig;
use crate::cli::ConfigError;
use crate::models::chat::ChatRequest;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("request carried neither messages nor a systemInstruction/prompt pair")]
    MissingConversation,

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
}

/// One chat-completion round trip against an upstream provider. The
/// provider's JSON response is handed back untouched.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<Value, ChatError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ConfigError> {
    let client = MistralChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
