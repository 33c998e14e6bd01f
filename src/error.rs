use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{ IntoResponse, Response },
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm::chat::ChatError;
use crate::proxy::ProxyError;
use crate::store::StoreError;

/// Failures surfaced over HTTP. Every variant maps to a 500 with a fixed
/// label and the underlying message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Memory Retrieval Fault")]
    StateRead(#[source] StoreError),

    #[error("Memory Storage Fault")]
    StateWrite(#[source] StoreError),

    #[error("Memory Storage Fault")]
    StateBody(#[source] JsonRejection),

    #[error("Neural link failed")]
    Upstream(#[from] ChatError),

    #[error("Neural link failed")]
    ChatBody(#[source] JsonRejection),

    #[error("Proxy error")]
    Proxy(#[from] ProxyError),
}

impl AppError {
    pub fn details(&self) -> String {
        match self {
            AppError::StateRead(e) | AppError::StateWrite(e) => e.to_string(),
            AppError::StateBody(e) | AppError::ChatBody(e) => e.body_text(),
            AppError::Upstream(e) => e.to_string(),
            AppError::Proxy(e) => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match &self {
            AppError::Proxy(_) => json!({ "error": self.to_string(), "message": self.details() }),
            _ => json!({ "error": self.to_string(), "details": self.details() }),
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
