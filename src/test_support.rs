//! Fake upstream provider for tests: a real axum server on an ephemeral port
//! that records every request and answers with a canned JSON body.

use axum::{
    body::Bytes,
    extract::Request,
    http::{ HeaderMap, Method, StatusCode },
    Json,
    Router,
};
use serde_json::Value;
use std::sync::{ Arc, Mutex };
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }
}

pub struct FakeUpstream {
    pub base_url: String,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeUpstream {
    pub async fn start(status: StatusCode, body: Value) -> Self {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);

        let app = Router::new().fallback(move |req: Request| {
            let sink = Arc::clone(&sink);
            let body = body.clone();
            async move {
                let (parts, incoming) = req.into_parts();
                let bytes = axum::body::to_bytes(incoming, usize::MAX).await.unwrap_or_default();
                sink.lock().unwrap().push(Recorded {
                    method: parts.method,
                    path: parts.uri.path().to_string(),
                    query: parts.uri.query().map(str::to_owned),
                    headers: parts.headers,
                    body: bytes,
                });
                (status, Json(body))
            }
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake upstream");
        let addr = listener.local_addr().expect("fake upstream addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { base_url: format!("http://{}", addr), recorded }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }
}

/// Base URL of a port nothing is listening on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{}", addr)
}
