pub mod chat;

use crate::cli::ServeArgs;

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";
pub const DEFAULT_MODEL: &str = "mistral-large-latest";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub completion_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn from_args(args: &ServeArgs) -> Self {
        Self {
            api_key: args.api_key().to_string(),
            base_url: args.chat_base_url.clone(),
            completion_model: args.chat_model.clone(),
            temperature: args.chat_temperature,
            max_tokens: args.chat_max_tokens,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            completion_model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}
