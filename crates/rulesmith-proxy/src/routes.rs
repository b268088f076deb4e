//! HTTP routes and handlers

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::TryStreamExt;
use rulesmith_core::{schema, validate, Error, RuleCandidate, RuleOutput, RuleRequest};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::proxy::{self, AppState};
use crate::upload::{StoredUpload, UploadError};

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let body_limit = state.config.uploads.max_request_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/generate-rule", post(generate_rule))
        .route("/api/validate-rule", post(validate_rule))
        .route("/api/rule-schema", get(rule_schema))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin; otherwise only the listed ones
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin: {}", o);
                        None
                    }
                }),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn rule_schema() -> Json<Value> {
    Json(schema::rule_output_schema())
}

/// Multipart form: `rule_name`, `rule_intent` and any number of file parts
async fn generate_rule(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<RuleOutput>, AppError> {
    metrics::counter!("rulesmith_requests_total", "endpoint" => "generate-rule").increment(1);
    let request_id = proxy::generate_request_id();

    // Refuse before any upload touches the disk
    state.generator.ready()?;

    let mut uploads = Vec::new();
    let result = handle_generation(&state, &request_id, multipart, &mut uploads).await;

    if !state.config.uploads.retain {
        state.uploads.remove_all(&uploads).await;
    }

    result.map(Json)
}

async fn handle_generation(
    state: &AppState,
    request_id: &str,
    mut multipart: Multipart,
    uploads: &mut Vec<StoredUpload>,
) -> Result<RuleOutput, AppError> {
    let mut name = None;
    let mut intent = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "rule_name" => name = Some(field.text().await?),
            "rule_intent" => intent = Some(field.text().await?),
            _ => {
                // Empty file inputs still arrive as a part with no file name
                let Some(file_name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string)
                else {
                    debug!("[{}] Ignoring form field '{}'", request_id, field_name);
                    continue;
                };
                let content_type = field.content_type().map(str::to_string);

                let mut rejection = None;
                let body = field.inspect_err(|e: &MultipartError| rejection = Some(e.status()));
                let persisted = state
                    .uploads
                    .persist(&file_name, content_type.as_deref(), body)
                    .await;

                match persisted {
                    Ok(stored) => uploads.push(stored),
                    Err(UploadError::Stream { message, .. }) => {
                        return Err(AppError::Rejected(
                            rejection.unwrap_or(StatusCode::BAD_REQUEST),
                            message,
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    let request = RuleRequest::new(
        required(name, "rule_name")?,
        required(intent, "rule_intent")?,
    );
    if request.name.is_empty() || request.intent.is_empty() {
        return Err(AppError::BadRequest(
            "rule_name and rule_intent must not be blank".to_string(),
        ));
    }

    info!(
        "[{}] Generating rule '{}' with {} reference files",
        request_id,
        request.name,
        uploads.len()
    );

    let media = proxy::encode_media(uploads).await?;
    Ok(proxy::generate_rule(state, request_id, &request, &media).await?)
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value.ok_or_else(|| AppError::BadRequest(format!("Missing form field '{}'", field)))
}

/// Re-check a rule that was edited outside the model
async fn validate_rule(
    payload: Result<Json<RuleCandidate>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    metrics::counter!("rulesmith_requests_total", "endpoint" => "validate-rule").increment(1);

    let Json(candidate) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let rule = validate(candidate).map_err(Error::from)?;

    let expressions: Vec<Value> = rule
        .expressions()
        .into_iter()
        .map(|e| {
            json!({
                "root_id": e.root_id,
                "text": e.to_string(),
                "tokens": e.tokens,
            })
        })
        .collect();

    Ok(Json(json!({
        "rule": rule,
        "expressions": expressions,
    })))
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// Body rejected while reading, with the status the extractor chose
    Rejected(StatusCode, String),
    Core(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Core(err)
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io(e) => AppError::Core(Error::Io(e)),
            UploadError::Stream { message, .. } => AppError::BadRequest(message),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Rejected(err.status(), err.body_text())
    }
}

/// HTTP status for a core error
fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::UnsupportedMedia(_) => StatusCode::BAD_REQUEST,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Upstream(rulesmith_core::UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        Error::Upstream(_) => StatusCode::BAD_GATEWAY,
        Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({"kind": "bad_request", "message": message, "retryable": false}),
            ),
            AppError::Rejected(status, message) => (
                status,
                json!({"kind": "bad_request", "message": message, "retryable": false}),
            ),
            AppError::Core(err) => {
                let status = status_for(&err);
                let mut body = json!({
                    "kind": err.kind().as_str(),
                    "message": err.to_string(),
                    "retryable": err.is_retryable(),
                });
                match &err {
                    Error::Validation(v) => {
                        body["rule"] = json!(v.rule().number());
                        if let Some(subject) = v.subject() {
                            body["subject"] = json!(subject);
                        }
                    }
                    Error::Upstream(u) => body["upstream"] = json!(u.label()),
                    _ => {}
                }
                if status.is_server_error() {
                    error!("Request failed: {}", err);
                }
                (status, body)
            }
        };

        (status, Json(json!({ "error": body }))).into_response()
    }
}
