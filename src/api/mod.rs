//! HTTP proxy between chat clients and the inference service.

// Allow clippy lint triggered by utoipa's OpenApi derive macro
#![allow(clippy::needless_for_each)]

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::config::Config;
use crate::core::inference::{ProxyChatRequest, ProxyMessage, ProxyTool};
use crate::core::tools::{McpServer, McpServerTool};
use crate::core::{Error, InferenceClient};

/// Shared application state.
pub struct AppState {
    /// Upstream inference client.
    pub inference: InferenceClient,

    /// API token for authentication (if configured).
    pub token: Option<String>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let token = config.api.token.clone();
        Self {
            inference: InferenceClient::new(config),
            token,
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Error body returned by every route.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    fn new(error: &str, details: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            details,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::InvalidModel(_) => (StatusCode::BAD_REQUEST, ErrorBody::new("Invalid model", None)),
            Self::Upstream { status, details } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                ErrorBody::new("Failed to fetch from model", Some(details)),
            ),
            Self::McpServers(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Failed to fetch MCP servers", None),
            ),
            e @ (Self::InvalidApiKey | Self::Http(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Internal server error", Some(e.to_string())),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// `OpenAPI` documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Portal Assist API",
        description = "Streaming chat proxy for the Heroku inference service",
        version = "0.1.0",
        license(name = "MIT")
    ),
    paths(health, chat, mcp_servers),
    components(schemas(ProxyChatRequest, ProxyMessage, ProxyTool, McpServer, McpServerTool, ErrorBody))
)]
struct ApiDoc;

/// Authentication middleware.
///
/// Validates the `Authorization: Bearer <token>` header if a token is configured.
async fn auth_middleware(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    // If no token configured, allow all requests (localhost-only mode)
    let Some(ref expected_token) = state.token else {
        return next.run(request).await;
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match auth_header {
        Some(token) if token == expected_token => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new(
                "unauthorized",
                Some("Missing or invalid Authorization header. Use: Bearer <token>".to_string()),
            )),
        )
            .into_response(),
    }
}

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    let protected_routes = Router::new()
        .route("/api/heroku-mia", get(mcp_servers).post(chat))
        .route("/api/mcp-servers", get(mcp_servers))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/openapi.json", get(openapi));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the proxy server.
///
/// # Errors
///
/// Returns an error if the server fails to bind or start.
pub async fn serve(config: Config, host: &str, port: u16) -> anyhow::Result<()> {
    let state: SharedState = Arc::new(AppState::new(config));
    let auth_enabled = state.token.is_some();
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if auth_enabled {
        tracing::info!(addr = %addr, "starting chat proxy (auth enabled)");
    } else {
        tracing::warn!(addr = %addr, "starting chat proxy (NO AUTH - localhost only recommended)");
    }

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy", body = String))
)]
async fn health() -> &'static str {
    "ok"
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Stream a chat completion from the inference service.
///
/// The upstream SSE body is passed through unchanged.
#[utoipa::path(
    post,
    path = "/api/heroku-mia",
    request_body = ProxyChatRequest,
    responses(
        (status = 200, description = "Streamed completion frames", body = String, content_type = "text/plain"),
        (status = 400, description = "Unknown model", body = ErrorBody),
        (status = 500, description = "Proxy failure", body = ErrorBody)
    )
)]
async fn chat(
    State(state): State<SharedState>,
    Json(request): Json<ProxyChatRequest>,
) -> Result<Response, Error> {
    let upstream = state.inference.stream_chat(&request).await?;
    let body = Body::from_stream(upstream.bytes_stream());

    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

/// List MCP servers registered with the inference service.
#[utoipa::path(
    get,
    path = "/api/mcp-servers",
    responses(
        (status = 200, description = "Registered MCP servers", body = Vec<McpServer>),
        (status = 500, description = "Listing failed", body = ErrorBody)
    )
)]
async fn mcp_servers(State(state): State<SharedState>) -> Result<Json<Vec<McpServer>>, Error> {
    let servers = state
        .inference
        .list_mcp_servers()
        .await
        .inspect_err(|e| tracing::error!(error = %e, "error fetching MCP servers"))?;

    Ok(Json(servers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_state(inference_url: &str, token: Option<String>) -> SharedState {
        let mut config = Config::default();
        config.inference.url = inference_url.to_string();
        config.api.token = token;
        Arc::new(AppState::new(config))
    }

    fn chat_request(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/heroku-mia")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = router(create_test_state("http://127.0.0.1:9", None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn openapi_lists_proxy_routes() {
        let app = router(create_test_state("http://127.0.0.1:9", None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert!(doc["paths"]["/api/heroku-mia"]["post"].is_object());
        assert!(doc["paths"]["/api/mcp-servers"]["get"].is_object());
    }

    #[tokio::test]
    async fn unknown_model_returns_400() {
        let app = router(create_test_state("http://127.0.0.1:9", None));

        let response = app
            .oneshot(chat_request(&serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "model": "gpt-4o"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, serde_json::json!({"error": "Invalid model"}));
    }

    #[tokio::test]
    async fn chat_streams_upstream_body_through() {
        let upstream = MockServer::start().await;
        let frames = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(frames, "text/event-stream"))
            .mount(&upstream)
            .await;

        let app = router(create_test_state(&upstream.uri(), None));
        let response = app
            .oneshot(chat_request(&serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "model": "claude-4-sonnet",
                "reasoning": true
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, frames.as_bytes());
    }

    #[tokio::test]
    async fn upstream_failure_keeps_status_and_details() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/agents/heroku"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({"error": {"message": "bad tool"}})),
            )
            .mount(&upstream)
            .await;

        let app = router(create_test_state(&upstream.uri(), None));
        let response = app
            .oneshot(chat_request(&serde_json::json!({
                "messages": [{"role": "user", "content": "run it"}],
                "model": "claude-4-sonnet",
                "tools": [{"name": "code_exec_python"}]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Failed to fetch from model", "details": "bad tool"})
        );
    }

    #[tokio::test]
    async fn mcp_servers_failure_returns_500() {
        let app = router(create_test_state("http://127.0.0.1:9", None));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/mcp-servers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Failed to fetch MCP servers"})
        );
    }

    #[tokio::test]
    async fn mcp_servers_proxies_listing() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/mcp/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "srv_1", "namespace": "crm", "tools": []}
            ])))
            .mount(&upstream)
            .await;

        let app = router(create_test_state(&upstream.uri(), None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/heroku-mia")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await[0]["id"], "srv_1");
    }

    #[tokio::test]
    async fn auth_middleware_rejects_request_without_token() {
        let app = router(create_test_state(
            "http://127.0.0.1:9",
            Some("secret-token".to_string()),
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/mcp-servers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_middleware_allows_valid_token() {
        let app = router(create_test_state(
            "http://127.0.0.1:9",
            Some("secret-token".to_string()),
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/heroku-mia")
                    .header("Authorization", "Bearer secret-token")
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        r#"{"messages":[],"model":"not-a-model"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Past auth, rejected by model lookup.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_is_public_with_token_configured() {
        let app = router(create_test_state(
            "http://127.0.0.1:9",
            Some("secret-token".to_string()),
        ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
