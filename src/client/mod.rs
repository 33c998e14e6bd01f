pub mod chat;
pub mod console;
pub mod state;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::models::chat::ChatMessage;
use crate::models::state::{ SaveAck, StateEnvelope };

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("a chat request is already in flight")]
    Busy,
}

/// Where a [`state::StateSession`] loads from and saves to.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn load_state(&self) -> Result<Option<Value>, ClientError>;

    async fn save_state(&self, state: &Value) -> Result<bool, ClientError>;
}

/// Where a [`chat::ChatSession`] sends its conversation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<Value, ClientError>;
}

/// HTTP client for a running simrelay server.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: Url,
}

#[derive(Serialize)]
struct SaveBody<'a> {
    state: &'a Value,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    messages: &'a [ChatMessage],
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        Ok(Self { http: HttpClient::new(), base_url })
    }

    fn endpoint(&self, route: &str) -> Result<Url, ClientError> {
        self.base_url.join(route).map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::Status { status: status.as_u16(), body })
    }
}

/// `false`, `0` and `""` count as nothing saved, same as `null`.
fn is_meaningful(state: &Value) -> bool {
    match state {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[async_trait]
impl StateBackend for ApiClient {
    async fn load_state(&self) -> Result<Option<Value>, ClientError> {
        let resp = self.http.get(self.endpoint("/api/state")?).send().await?;
        let envelope: StateEnvelope = Self::checked(resp).await?.json().await?;
        Ok(envelope.state.filter(is_meaningful))
    }

    async fn save_state(&self, state: &Value) -> Result<bool, ClientError> {
        let resp = self.http
            .post(self.endpoint("/api/state")?)
            .json(&SaveBody { state })
            .send()
            .await?;
        let ack: SaveAck = Self::checked(resp).await?.json().await?;
        Ok(ack.success)
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<Value, ClientError> {
        let resp = self.http
            .post(self.endpoint("/api/chat")?)
            .json(&ChatBody { messages })
            .send()
            .await?;
        Ok(Self::checked(resp).await?.json().await?)
    }
}
