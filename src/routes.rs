use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::handlers::{generate_script_handler, health_handler, metrics_handler, tts_handler};
use crate::rate_limit::{RateLimitGuard, enforce};
use crate::state::AppState;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builds the full application: routes, both limiters, CORS and tracing.
pub fn create_router(state: Arc<AppState>) -> Router {
    let global = RateLimitGuard::new(Arc::clone(&state.global_limiter), state.trust_proxy);
    let generate = RateLimitGuard::new(Arc::clone(&state.generate_limiter), state.trust_proxy);

    // generation pays both limiters, global first
    let generation = Router::new()
        .route("/api/generate-script", post(generate_script_handler))
        .route_layer(middleware::from_fn_with_state(generate, enforce));

    let limited = Router::new()
        .route("/api/tts", post(tts_handler))
        .merge(generation)
        .route_layer(middleware::from_fn_with_state(global, enforce));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(limited)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS allows any origin");
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GeminiClient;
    use crate::rate_limit::{GENERATE_MESSAGE, GLOBAL_MESSAGE, RateLimiter};
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCRIPT_PATH: &str = "/models/script-model:generateContent";
    const TTS_PATH: &str = "/models/tts-model:generateContent";

    fn app(server: &MockServer, global_max: u32, generate_max: u32) -> (Router, Arc<AppState>) {
        let gemini = GeminiClient::new(
            server.uri(),
            "test-key".into(),
            "script-model".into(),
            "tts-model".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        let state = Arc::new(AppState {
            gemini,
            global_limiter: Arc::new(RateLimiter::new(
                "global",
                global_max,
                Duration::from_secs(900),
                GLOBAL_MESSAGE,
            )),
            generate_limiter: Arc::new(RateLimiter::new(
                "generate",
                generate_max,
                Duration::from_secs(3600),
                GENERATE_MESSAGE,
            )),
            allowed_origins: vec!["http://allowed.example".into()],
            trust_proxy: false,
        });
        (create_router(Arc::clone(&state)), state)
    }

    fn with_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        with_peer(req, "10.0.0.1:4000")
    }

    fn get(uri: &str) -> Request<Body> {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        with_peer(req, "10.0.0.1:4000")
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_body(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn script_body() -> Value {
        json!({
            "prompt": "a chat about ownership",
            "language": "English",
            "speakers": [{ "name": "Ana" }, { "name": "Ben" }],
            "targetMinutes": 3
        })
    }

    fn tts_body(voice: &str) -> Value {
        json!({ "text": "Ana: Hello there", "voice": voice })
    }

    async fn mount_script_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(SCRIPT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "Ana: Hi\nBen: Hey" }] } }]
            })))
            .mount(server)
            .await;
    }

    async fn mount_tts_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(TTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{
                    "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": "UklGRg==" }
                }] } }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn health_is_ok_and_never_counted() {
        let server = MockServer::start().await;
        let (app, state) = app(&server, 1, 1);

        for _ in 0..5 {
            let res = send(&app, get("/api/health")).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(json_body(res).await["status"], "ok");
        }
        assert_eq!(state.global_limiter.tracked_clients(), 0);
        assert_eq!(state.generate_limiter.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn script_is_generated() {
        let server = MockServer::start().await;
        mount_script_ok(&server).await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, post_json("/api/generate-script", script_body())).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await, json!({ "script": "Ana: Hi\nBen: Hey" }));
    }

    #[tokio::test]
    async fn short_prompt_is_rejected_without_calling_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (app, _) = app(&server, 100, 10);

        let mut body = script_body();
        body["prompt"] = json!("hey");
        let res = send(&app, post_json("/api/generate-script", body)).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json_body(res).await;
        assert!(body["error"].as_str().unwrap().starts_with("Prompt must be"));
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let server = MockServer::start().await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, post_json("/api/tts", json!({ "text": "no voice" }))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method("POST")
            .uri("/api/tts")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = send(&app, with_peer(req, "10.0.0.1:4000")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn missing_or_wrong_content_type_is_a_bad_request() {
        let server = MockServer::start().await;
        let (app, _) = app(&server, 100, 10);

        for content_type in [None, Some("text/plain")] {
            let mut builder = Request::builder().method("POST").uri("/api/tts");
            if let Some(ct) = content_type {
                builder = builder.header("content-type", ct);
            }
            let req = builder
                .body(Body::from(tts_body("Kore").to_string()))
                .unwrap();

            let res = send(&app, with_peer(req, "10.0.0.1:4000")).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{content_type:?}");
            let body = json_body(res).await;
            assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
        }
    }

    #[tokio::test]
    async fn oversized_body_is_413_with_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (app, _) = app(&server, 100, 10);

        let body = json!({ "text": "x".repeat(MAX_BODY_BYTES), "voice": "Kore" });
        let res = send(&app, post_json("/api/tts", body)).await;

        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(res).await, json!({ "error": "Request body too large" }));
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_json_error() {
        let server = MockServer::start().await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, get("/api/tts")).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json_body(res).await, json!({ "error": "Method not allowed" }));

        let res = send(&app, post_json("/api/health", json!({}))).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json_body(res).await["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn tts_returns_upstream_audio() {
        let server = MockServer::start().await;
        mount_tts_ok(&server).await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, post_json("/api/tts", tts_body("Puck"))).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["audio"], "UklGRg==");
        assert_eq!(body["mimeType"], "audio/L16;codec=pcm;rate=24000");
    }

    #[tokio::test]
    async fn unknown_voice_is_rejected() {
        let server = MockServer::start().await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, post_json("/api/tts", tts_body("Alloy"))).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "Invalid voice: Alloy");
    }

    #[tokio::test]
    async fn generation_limit_is_separate_from_tts() {
        let server = MockServer::start().await;
        mount_script_ok(&server).await;
        mount_tts_ok(&server).await;
        let (app, _) = app(&server, 100, 2);

        for _ in 0..2 {
            let res = send(&app, post_json("/api/generate-script", script_body())).await;
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = send(&app, post_json("/api/generate-script", script_body())).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "3600");
        assert_eq!(json_body(res).await["error"], GENERATE_MESSAGE);

        let res = send(&app, post_json("/api/tts", tts_body("Kore"))).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn global_limit_spans_routes_and_clients_are_isolated() {
        let server = MockServer::start().await;
        mount_script_ok(&server).await;
        mount_tts_ok(&server).await;
        let (app, state) = app(&server, 2, 10);

        assert_eq!(send(&app, post_json("/api/tts", tts_body("Kore"))).await.status(), StatusCode::OK);
        assert_eq!(
            send(&app, post_json("/api/generate-script", script_body())).await.status(),
            StatusCode::OK
        );

        let res = send(&app, post_json("/api/generate-script", script_body())).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(res).await["error"], GLOBAL_MESSAGE);
        // rejected globally, so the generation window only saw one request
        let res = send(&app, post_json("/api/tts", tts_body("Kore"))).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        let other = with_peer(
            Request::builder()
                .method("POST")
                .uri("/api/tts")
                .header("content-type", "application/json")
                .body(Body::from(tts_body("Kore").to_string()))
                .unwrap(),
            "10.0.0.2:4000",
        );
        assert_eq!(send(&app, other).await.status(), StatusCode::OK);
        assert_eq!(state.global_limiter.tracked_clients(), 2);
        assert_eq!(state.generate_limiter.tracked_clients(), 1);
    }

    #[tokio::test]
    async fn upstream_quota_maps_to_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, post_json("/api/tts", tts_body("Kore"))).await;

        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(res).await["error"], crate::error::QUOTA_MESSAGE);
    }

    #[tokio::test]
    async fn other_upstream_failures_are_generic_500s() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend on fire"))
            .mount(&server)
            .await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, post_json("/api/tts", tts_body("Kore"))).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(res).await, json!({ "error": "Failed to generate audio" }));

        let res = send(&app, post_json("/api/generate-script", script_body())).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(res).await, json!({ "error": "Failed to generate script" }));
    }

    #[tokio::test]
    async fn cors_only_echoes_allowed_origins() {
        let server = MockServer::start().await;
        let (app, _) = app(&server, 100, 10);

        let preflight = |origin: &str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/api/tts")
                .header("origin", origin)
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "content-type")
                .body(Body::empty())
                .unwrap()
        };

        let res = send(&app, preflight("http://allowed.example")).await;
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://allowed.example"
        );

        let res = send(&app, preflight("http://evil.example")).await;
        assert!(res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn unknown_routes_are_404() {
        let server = MockServer::start().await;
        let (app, _) = app(&server, 100, 10);

        let res = send(&app, get("/api/nope")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await["error"], "Not found");
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        let server = MockServer::start().await;
        let (app, _) = app(&server, 100, 10);

        send(&app, post_json("/api/tts", tts_body("Alloy"))).await;
        let res = send(&app, get("/metrics")).await;

        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("podcast_proxy_requests_total"));
    }
}
