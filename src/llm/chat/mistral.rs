use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::{ ChatClient, ChatError };
use crate::cli::ConfigError;
use crate::llm::LlmConfig;
use crate::models::chat::{ ChatMessage, ChatRequest };

const CHAT_ROUTE: &str = "/v1/chat/completions";

pub struct MistralChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    endpoint: Url,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct MistralChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

impl MistralChatClient {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        temperature: f32,
        max_tokens: u32
    ) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let endpoint = Url::parse(&format!("{}{}", base_url.trim_end_matches('/'), CHAT_ROUTE))
            .map_err(|e| ConfigError::InvalidUpstream(format!("{}: {}", base_url, e)))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|e| ConfigError::InvalidUpstream(format!("Invalid API key format: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::InvalidUpstream(e.to_string()))?;

        Ok(Self {
            http,
            model,
            base_url,
            endpoint,
            temperature,
            max_tokens,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.temperature,
            config.max_tokens
        )
    }
}

#[async_trait]
impl ChatClient for MistralChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<Value, ChatError> {
        let messages = request.conversation().ok_or(ChatError::MissingConversation)?;

        let payload = MistralChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: &messages,
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
        };
        debug!(
            "Dispatching {} message(s) to {} with model {}",
            messages.len(),
            self.endpoint,
            payload.model
        );

        let resp = self.http.post(self.endpoint.clone()).json(&payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Status { status: status.as_u16(), body });
        }

        Ok(resp.json::<Value>().await?)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}
