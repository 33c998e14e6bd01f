use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{ rejection::JsonRejection, DefaultBodyLimit, Request, State },
    http::{ header::{ AUTHORIZATION, CONTENT_TYPE }, Method, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use serde_json::Value;
use tower_http::cors::{ Any, CorsLayer };
use log::{ debug, error };

use crate::error::AppError;
use crate::llm::chat::ChatClient;
use crate::models::chat::ChatRequest;
use crate::models::state::{ SaveAck, StateEnvelope };
use crate::proxy::{ PassthroughProxy, MAX_FORWARD_BYTES };
use crate::store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub chat: Arc<dyn ChatClient>,
    pub proxy: Option<PassthroughProxy>,
}

/// Also answers every `OPTIONS` request, preflight or not, before routing.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/api/state", get(get_state_handler).post(save_state_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/mistral/chat", post(chat_handler));

    if state.proxy.is_some() {
        app = app.fallback(proxy_handler);
    }

    app.layer(DefaultBodyLimit::max(MAX_FORWARD_BYTES))
        .layer(cors_layer())
        .with_state(state)
}

async fn get_state_handler(State(state): State<AppState>) -> Result<Json<StateEnvelope>, AppError> {
    let current = state.store.get().await.map_err(|e| {
        error!("Memory Retrieval Fault: {}", e);
        AppError::StateRead(e)
    })?;
    Ok(Json(StateEnvelope { state: current }))
}

async fn save_state_handler(
    State(state): State<AppState>,
    payload: Result<Json<StateEnvelope>, JsonRejection>
) -> Result<Json<SaveAck>, AppError> {
    let Json(payload) = payload.map_err(|e| {
        error!("Memory Storage Fault: {}", e.body_text());
        AppError::StateBody(e)
    })?;
    let document = payload.state.unwrap_or(Value::Null);
    state.store.put(&document).await.map_err(|e| {
        error!("Memory Storage Fault: {}", e);
        AppError::StateWrite(e)
    })?;
    debug!("Saved simulation state");
    Ok(Json(SaveAck { success: true }))
}

async fn chat_handler(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<Value>, AppError> {
    let Json(request) = request.map_err(|e| {
        error!("Neural Fault: {}", e.body_text());
        AppError::ChatBody(e)
    })?;
    match state.chat.complete(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("Neural Fault: {}", e);
            Err(AppError::Upstream(e))
        }
    }
}

async fn proxy_handler(State(state): State<AppState>, req: Request) -> Result<Response, AppError> {
    let Some(proxy) = state.proxy.as_ref() else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    proxy.forward(req).await.map_err(|e| {
        error!("Proxy error: {}", e);
        AppError::Proxy(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::new_client;
    use crate::llm::LlmConfig;
    use crate::store::{ MemoryStateStore, StoreError };
    use crate::test_support::{ unreachable_base_url, FakeUpstream };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn get(&self) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Task("medium unreadable".into()))
        }

        async fn put(&self, _state: &Value) -> Result<(), StoreError> {
            Err(StoreError::Task("medium unwritable".into()))
        }

        fn describe(&self) -> String {
            "broken".into()
        }
    }

    fn app_with(store: Arc<dyn StateStore>, upstream: &str, proxy: bool) -> Router {
        let config = LlmConfig {
            api_key: "server-key".into(),
            base_url: upstream.to_string(),
            ..LlmConfig::default()
        };
        router(AppState {
            store,
            chat: new_client(&config).unwrap(),
            proxy: proxy.then(|| PassthroughProxy::new(upstream).unwrap()),
        })
    }

    fn memory_app() -> Router {
        app_with(Arc::new(MemoryStateStore::default()), "https://api.mistral.ai", false)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Response) {
        let res = app.clone().oneshot(req).await.unwrap();
        (res.status(), res)
    }

    async fn json_of(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_state() -> Request<Body> {
        Request::builder().uri("/api/state").body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn allow_origin(res: &Response) -> Option<&str> {
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn fresh_store_reads_null() {
        let app = memory_app();
        let (status, res) = send(&app, get_state()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(allow_origin(&res), Some("*"));
        assert_eq!(json_of(res).await, json!({ "state": null }));
    }

    #[tokio::test]
    async fn saved_documents_read_back_unchanged() {
        let app = memory_app();
        let docs = [
            json!({ "counter": 4, "notes": "x", "deep": { "list": [1, [2, { "k": null }], true] } }),
            json!({}),
            json!([1.5, -2, "s"]),
        ];
        for doc in docs {
            let (status, res) = send(&app, post_json("/api/state", json!({ "state": doc }))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json_of(res).await, json!({ "success": true }));

            let (_, res) = send(&app, get_state()).await;
            assert_eq!(json_of(res).await, json!({ "state": doc }));
        }
    }

    #[tokio::test]
    async fn repeated_and_sequential_saves() {
        let app = memory_app();
        let a = json!({ "state": { "v": "A" } });
        let b = json!({ "state": { "v": "B" } });

        send(&app, post_json("/api/state", a.clone())).await;
        send(&app, post_json("/api/state", a.clone())).await;
        let (_, res) = send(&app, get_state()).await;
        assert_eq!(json_of(res).await, a);

        send(&app, post_json("/api/state", b.clone())).await;
        let (_, res) = send(&app, get_state()).await;
        assert_eq!(json_of(res).await, b);
    }

    #[tokio::test]
    async fn storage_faults_are_500_with_cors() {
        let app = app_with(Arc::new(BrokenStore), "https://api.mistral.ai", false);

        let (status, res) = send(&app, get_state()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin(&res), Some("*"));
        assert_eq!(json_of(res).await["error"], "Memory Retrieval Fault");

        let (status, res) = send(&app, post_json("/api/state", json!({ "state": {} }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin(&res), Some("*"));
        let body = json_of(res).await;
        assert_eq!(body["error"], "Memory Storage Fault");
        assert_eq!(body["details"], "storage task failed: medium unwritable");
    }

    #[tokio::test]
    async fn chat_returns_upstream_body_and_normalizes_legacy_form() {
        let reply = json!({
            "id": "cmpl-9",
            "object": "chat.completion",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "pong" } }]
        });
        let upstream = FakeUpstream::start(StatusCode::OK, reply.clone()).await;
        let app = app_with(Arc::new(MemoryStateStore::default()), &upstream.base_url, false);

        let (status, res) = send(
            &app,
            post_json("/api/mistral/chat", json!({ "systemInstruction": "S", "prompt": "P" }))
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(allow_origin(&res), Some("*"));
        assert_eq!(json_of(res).await, reply);

        let seen = upstream.requests();
        assert_eq!(seen[0].header("authorization").as_deref(), Some("Bearer server-key"));
        let sent: Value = serde_json::from_slice(&seen[0].body).unwrap();
        assert_eq!(
            sent["messages"],
            json!([
                { "role": "system", "content": "S" },
                { "role": "user", "content": "P" }
            ])
        );
    }

    #[tokio::test]
    async fn chat_network_failure_is_500_with_error_field() {
        let app = app_with(Arc::new(MemoryStateStore::default()), &unreachable_base_url(), false);
        let (status, res) = send(
            &app,
            post_json("/api/chat", json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        ).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin(&res), Some("*"));
        let body = json_of(res).await;
        assert_eq!(body["error"], "Neural link failed");
        assert!(body["details"].as_str().is_some());
    }

    #[tokio::test]
    async fn chat_upstream_rejection_is_also_500() {
        let upstream = FakeUpstream::start(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "message": "slow down" })
        ).await;
        let app = app_with(Arc::new(MemoryStateStore::default()), &upstream.base_url, false);
        let (status, res) = send(
            &app,
            post_json("/api/chat", json!({ "messages": [{ "role": "user", "content": "hi" }] }))
        ).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_of(res).await["details"].as_str().unwrap().contains("429"));
    }

    #[tokio::test]
    async fn unreadable_chat_bodies_are_500_json() {
        let upstream = FakeUpstream::start(StatusCode::OK, json!({ "choices": [] })).await;
        let app = app_with(Arc::new(MemoryStateStore::default()), &upstream.base_url, false);

        let no_content_type = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .body(Body::from(json!({ "messages": [] }).to_string()))
            .unwrap();
        let malformed = Request::builder()
            .method("POST")
            .uri("/api/mistral/chat")
            .header("content-type", "application/json")
            .body(Body::from("{\"messages\": ["))
            .unwrap();
        let unknown_role = post_json(
            "/api/chat",
            json!({ "messages": [{ "role": "tool", "content": "x" }] })
        );

        for req in [no_content_type, malformed, unknown_role] {
            let (status, res) = send(&app, req).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(allow_origin(&res), Some("*"));
            let body = json_of(res).await;
            assert_eq!(body["error"], "Neural link failed");
            assert!(body["details"].as_str().is_some_and(|d| !d.is_empty()));
        }
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn unreadable_state_bodies_are_500_json_and_store_untouched() {
        let app = memory_app();
        send(&app, post_json("/api/state", json!({ "state": { "v": 1 } }))).await;

        let malformed = Request::builder()
            .method("POST")
            .uri("/api/state")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let (status, res) = send(&app, malformed).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin(&res), Some("*"));
        assert_eq!(json_of(res).await["error"], "Memory Storage Fault");

        let (_, res) = send(&app, get_state()).await;
        assert_eq!(json_of(res).await, json!({ "state": { "v": 1 } }));
    }

    #[tokio::test]
    async fn state_bodies_above_default_axum_limit_are_accepted() {
        let app = memory_app();
        let notes = "n".repeat(3 * 1024 * 1024);
        let doc = json!({ "counter": 1, "notes": notes });

        let (status, res) = send(&app, post_json("/api/state", json!({ "state": doc }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(res).await, json!({ "success": true }));

        let (_, res) = send(&app, get_state()).await;
        assert_eq!(json_of(res).await["state"]["notes"].as_str().map(str::len), Some(3 * 1024 * 1024));
    }

    #[tokio::test]
    async fn options_is_answered_locally_everywhere() {
        let app = memory_app();

        let preflight = Request::builder()
            .method("OPTIONS")
            .uri("/api/chat")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let (status, res) = send(&app, preflight).await;
        assert!(status.is_success());
        assert_eq!(allow_origin(&res), Some("*"));
        let methods = res.headers()["access-control-allow-methods"].to_str().unwrap().to_string();
        assert!(methods.contains("POST") && methods.contains("DELETE"));

        let bare = Request::builder()
            .method("OPTIONS")
            .uri("/api/state")
            .body(Body::empty())
            .unwrap();
        let (status, res) = send(&app, bare).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(allow_origin(&res), Some("*"));
    }

    #[tokio::test]
    async fn unmatched_paths_are_404_without_proxy() {
        let app = memory_app();
        let req = Request::builder().uri("/v1/models").body(Body::empty()).unwrap();
        let (status, res) = send(&app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(allow_origin(&res), Some("*"));
    }

    #[tokio::test]
    async fn proxy_mode_mirrors_unmatched_requests() {
        let upstream = FakeUpstream::start(StatusCode::OK, json!({ "data": [{ "id": "m" }] })).await;
        let app = app_with(Arc::new(MemoryStateStore::default()), &upstream.base_url, true);

        let req = Request::builder()
            .uri("/v1/models?capability=chat")
            .header("authorization", "Bearer caller")
            .body(Body::empty())
            .unwrap();
        let (status, res) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(allow_origin(&res), Some("*"));
        assert_eq!(json_of(res).await, json!({ "data": [{ "id": "m" }] }));

        let seen = upstream.requests();
        assert_eq!(seen[0].path, "/v1/models");
        assert_eq!(seen[0].query.as_deref(), Some("capability=chat"));
        assert_eq!(seen[0].header("content-type").as_deref(), Some("application/json"));
        assert_eq!(seen[0].header("authorization").as_deref(), Some("Bearer caller"));
    }

    #[tokio::test]
    async fn proxy_failure_is_500_with_cors() {
        let app = app_with(Arc::new(MemoryStateStore::default()), &unreachable_base_url(), true);
        let req = Request::builder().uri("/v1/models").body(Body::empty()).unwrap();
        let (status, res) = send(&app, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin(&res), Some("*"));
        let body = json_of(res).await;
        assert_eq!(body["error"], "Proxy error");
        assert!(body["message"].as_str().is_some());
    }
}
