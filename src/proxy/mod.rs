//! Generic reverse proxy onto the upstream provider API. Any path, method
//! and query string is replayed against the upstream base URL; only the
//! `Authorization` and `Content-Type` request headers are carried over.

use axum::{
    body::{ Body, Bytes },
    extract::Request,
    http::{ header, HeaderMap, HeaderValue, Method },
    response::Response,
};
use log::debug;
use reqwest::Client as HttpClient;
use thiserror::Error;
use url::Url;

use crate::cli::ConfigError;

/// Largest request body the proxy will buffer before forwarding.
pub const MAX_FORWARD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid upstream target {0}")]
    InvalidTarget(String),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct PassthroughProxy {
    http: HttpClient,
    base_url: String,
}

impl PassthroughProxy {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUpstream(format!("{}: {}", base_url, e)))?;
        let http = HttpClient::builder()
            .build()
            .map_err(|e| ConfigError::InvalidUpstream(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// Upstream URL for an incoming `path?query`.
    pub fn target_url(&self, path_and_query: &str) -> Result<Url, ProxyError> {
        let joined = format!("{}{}", self.base_url, path_and_query);
        Url::parse(&joined).map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", joined, e)))
    }

    pub async fn forward(&self, req: Request) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();
        let path_and_query = parts.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = self.target_url(path_and_query)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(auth) = parts.headers.get(header::AUTHORIZATION) {
            headers.insert(header::AUTHORIZATION, auth.clone());
        }

        let mut upstream = self.http.request(parts.method.clone(), target.clone()).headers(headers);
        if parts.method != Method::GET && parts.method != Method::HEAD {
            let bytes: Bytes = axum::body::to_bytes(body, MAX_FORWARD_BYTES)
                .await
                .map_err(|e| ProxyError::Body(e.to_string()))?;
            upstream = upstream.body(bytes);
        }

        debug!("Proxying {} {}", parts.method, target);
        let resp = upstream.send().await?;

        let status = resp.status();
        let mut mirrored = HeaderMap::new();
        for (name, value) in resp.headers() {
            if !is_hop_by_hop(name.as_str()) && !name.as_str().starts_with("access-control-") {
                mirrored.append(name.clone(), value.clone());
            }
        }
        let bytes = resp.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = mirrored;
        Ok(response)
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}
