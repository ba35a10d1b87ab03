use std::{any::Any as PanicPayload, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::{FailurePolicy, ServerOptions, ServiceConfig},
    error::RelayError,
    llm::{self, ChatBackend, CompletionsClient},
    models::{GenerationParams, PromptRequest},
    telemetry,
};

/**
 * \brief Shared, read-only request state.
 */
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ChatBackend>,
    pub params: Arc<GenerationParams>,
    pub failure_policy: FailurePolicy,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>, options: &ServerOptions) -> Self {
        Self {
            backend,
            params: Arc::new(options.params.clone()),
            failure_policy: options.failure_policy,
        }
    }
}

/**
 * \brief Build the relay routes with open CORS and request tracing.
 */
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/**
 * \brief Start the relay and serve until Ctrl-C.
 * \param config provider configuration, loaded once at startup
 */
pub async fn run(config: Arc<ServiceConfig>, options: ServerOptions) -> Result<()> {
    let model = config.model.clone();
    let backend = CompletionsClient::new(config).context("build provider client failed")?;
    let state = AppState::new(Arc::new(backend), &options);

    let listener = tokio::net::TcpListener::bind(options.addr)
        .await
        .with_context(|| format!("bind {} failed", options.addr))?;
    tracing::info!(addr = %options.addr, %model, "Server listening on http://{}", options.addr);
    telemetry::log_event("server.start", &format!("addr={} model={}", options.addr, model));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/**
 * \brief Render a handler panic as 500 `{"error": ...}` instead of dropping the connection.
 */
fn panic_response(err: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let msg = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("handler panicked: {}", msg);
    RelayError::Internal(msg).into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}

/**
 * \brief POST /chat: resolve the prompt, generate, wrap as `{"response": ...}`.
 */
async fn chat(State(state): State<AppState>, req: Request) -> Response {
    match relay(&state, req).await {
        Ok(resp) => resp,
        Err(e) => {
            if let RelayError::Internal(msg) = &e {
                tracing::warn!("chat request rejected: {}", msg);
            }
            e.into_response()
        }
    }
}

async fn relay(state: &AppState, req: Request) -> Result<Response, RelayError> {
    let prompt = resolve_prompt(req).await?.unwrap_or_default();
    let request = PromptRequest::new(prompt, state.params.as_ref().clone())
        .ok_or(RelayError::MissingPrompt)?;

    telemetry::log_event(
        "server.chat",
        &format!(
            "model={} prompt_len={}",
            state.backend.model(),
            request.prompt.len()
        ),
    );

    match llm::generate(state.backend.as_ref(), &request).await {
        Ok(reply) => Ok(Json(json!({ "response": reply.text })).into_response()),
        Err(e) => match state.failure_policy {
            FailurePolicy::InBand => Ok(Json(json!({ "response": llm::apology(&e) })).into_response()),
            FailurePolicy::Status => Err(RelayError::Upstream(e)),
        },
    }
}

/**
 * \brief GET /health: static liveness payload, never contacts the provider.
 */
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Backend is running!",
        "status": "success",
        "api_connected": true,
        "model": state.backend.model(),
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    UrlEncoded,
    Multipart,
    Other,
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let mime = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        "application/json" => BodyKind::Json,
        "application/x-www-form-urlencoded" => BodyKind::UrlEncoded,
        "multipart/form-data" => BodyKind::Multipart,
        m if m.starts_with("application/") && m.ends_with("+json") => BodyKind::Json,
        _ => BodyKind::Other,
    }
}

/**
 * \brief Pull the prompt out of a JSON body (`prompt`, then `question`) or a form
 * body (`prompt`). `Ok(None)` means no usable prompt was found.
 */
async fn resolve_prompt(req: Request) -> Result<Option<String>, RelayError> {
    match body_kind(req.headers()) {
        BodyKind::Json => {
            let body = Bytes::from_request(req, &())
                .await
                .map_err(|e| rejected(e.status(), e.body_text()))?;
            prompt_from_json(&body)
        }
        BodyKind::UrlEncoded => {
            // first value wins on repeated keys
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, &())
                .await
                .map_err(|e| rejected(e.status(), e.body_text()))?;
            Ok(pairs
                .into_iter()
                .find(|(key, _)| key == "prompt")
                .map(|(_, value)| value)
                .filter(|p| !p.is_empty()))
        }
        BodyKind::Multipart => {
            let mut multipart = Multipart::from_request(req, &())
                .await
                .map_err(|e| rejected(e.status(), e.body_text()))?;
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| rejected(e.status(), e.body_text()))?
            {
                if field.name() == Some("prompt") && field.file_name().is_none() {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| rejected(e.status(), e.body_text()))?;
                    return Ok(Some(text).filter(|p| !p.is_empty()));
                }
            }
            Ok(None)
        }
        BodyKind::Other => Ok(None),
    }
}

/**
 * \brief Body extraction failures are internal errors, except an oversized body
 * which keeps its 413.
 */
fn rejected(status: StatusCode, text: String) -> RelayError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::PayloadTooLarge(text)
    } else {
        RelayError::Internal(text)
    }
}

fn prompt_from_json(body: &[u8]) -> Result<Option<String>, RelayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::Internal(format!("Failed to decode JSON object: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RelayError::Internal("JSON body must be an object".to_string()))?;
    if let Some(prompt) = string_field(obj, "prompt")? {
        return Ok(Some(prompt));
    }
    string_field(obj, "question")
}

fn string_field(
    obj: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<String>, RelayError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v) if is_falsy(v) => Ok(None),
        Some(other) => Err(RelayError::Internal(format!(
            "field `{}` must be a string, got {}",
            key, other
        ))),
    }
}

/** \brief `false`, `0`, `[]` and `{}` count as absent, like an empty string. */
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Null => true,
        Value::String(s) => s.is_empty(),
    }
}
