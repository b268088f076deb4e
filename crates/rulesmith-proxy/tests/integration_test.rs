//! Integration tests for the Rulesmith proxy router

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use rulesmith_core::{Error, PromptPayload, RuleCandidate};
use rulesmith_proxy::config::ServiceConfig;
use rulesmith_proxy::{create_router, AppState, OpenAiGenerator, RuleGenerator, UploadStore};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const BOUNDARY: &str = "rulesmith-test-boundary";

const PHONE_OR_HELMET: &str = r#"{
    "visual_detection": {"target_objects": ["worker", "phone", "helmet"]},
    "trigger_logic": {
        "nodes": [
            {"id": "or", "type": "logic", "data": {"logicType": "OR", "label": ""}},
            {"id": "a", "type": "content", "data": {"logicType": "", "label": "worker is using a phone"}},
            {"id": "b", "type": "content", "data": {"logicType": "", "label": "worker is not wearing a helmet"}}
        ],
        "edges": [
            {"id": "e1", "source": "or", "target": "a"},
            {"id": "e2", "source": "or", "target": "b"}
        ],
        "temporal_threshold_seconds": -1
    },
    "alert_message": "Safety violation at the gate"
}"#;

const CYCLIC: &str = r#"{
    "visual_detection": {"target_objects": ["worker"]},
    "trigger_logic": {
        "nodes": [
            {"id": "x", "type": "logic", "data": {"logicType": "AND", "label": ""}},
            {"id": "y", "type": "logic", "data": {"logicType": "OR", "label": ""}},
            {"id": "c", "type": "content", "data": {"logicType": "", "label": "worker is present"}}
        ],
        "edges": [
            {"id": "e1", "source": "x", "target": "y"},
            {"id": "e2", "source": "y", "target": "x"},
            {"id": "e3", "source": "y", "target": "c"}
        ],
        "temporal_threshold_seconds": 5
    },
    "alert_message": "Loop"
}"#;

/// Generator returning a fixed candidate and counting media parts it was shown
struct StubGenerator {
    answer: Option<RuleCandidate>,
    media_seen: Mutex<Vec<usize>>,
}

impl StubGenerator {
    fn answering(json: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(serde_json::from_str(json).unwrap()),
            media_seen: Mutex::new(Vec::new()),
        })
    }

    fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            media_seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RuleGenerator for StubGenerator {
    fn ready(&self) -> rulesmith_core::Result<()> {
        match self.answer {
            Some(_) => Ok(()),
            None => Err(Error::config("model API key is not configured")),
        }
    }

    async fn generate(&self, payload: &PromptPayload) -> rulesmith_core::Result<RuleCandidate> {
        self.media_seen.lock().unwrap().push(payload.media_count());
        self.answer
            .clone()
            .ok_or_else(|| Error::config("model API key is not configured"))
    }

    fn model(&self) -> &str {
        "stub"
    }
}

async fn router_with(
    generator: Arc<dyn RuleGenerator>,
    upload_dir: &Path,
    configure: impl FnOnce(&mut ServiceConfig),
) -> Router {
    let mut config = ServiceConfig::default();
    config.uploads.dir = upload_dir.to_path_buf();
    configure(&mut config);

    let uploads = UploadStore::open(&config.uploads.dir).await.unwrap();
    let handle = PrometheusBuilder::new().build_recorder().handle();
    create_router(AppState::with_generator(config, generator, uploads, handle))
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        file_name: &'a str,
        content_type: Option<&'a str>,
        bytes: &'a [u8],
    },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                        file_name
                    )
                    .as_bytes(),
                );
                if let Some(ct) = content_type {
                    body.extend_from_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn generate_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/generate-rule")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn json_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |_| {}).await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_rule_schema_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |_| {}).await;

    let response = app
        .oneshot(Request::get("/api/rule-schema").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let schema = body_json(response).await;
    let properties = &schema["properties"];
    assert!(properties.get("visual_detection").is_some());
    assert!(properties.get("trigger_logic").is_some());
    assert!(properties.get("alert_message").is_some());
}

#[tokio::test]
async fn test_generate_rule_with_reference_media() {
    let dir = tempfile::tempdir().unwrap();
    let generator = StubGenerator::answering(PHONE_OR_HELMET);
    let app = router_with(generator.clone(), dir.path(), |_| {}).await;

    let response = app
        .oneshot(generate_request(&[
            Part::Text("rule_name", "Gate safety"),
            Part::Text("rule_intent", "Alert when a worker uses a phone or has no helmet"),
            Part::File {
                file_name: "gate.png",
                content_type: Some("image/png"),
                bytes: b"\x89PNG fake",
            },
            Part::File {
                file_name: "notes.txt",
                content_type: Some("text/plain"),
                bytes: b"not media",
            },
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rule = body_json(response).await;
    assert_eq!(rule["trigger_logic"]["temporal_threshold_seconds"], -1);
    assert_eq!(rule["trigger_logic"]["nodes"][0]["data"]["logicType"], "OR");
    assert_eq!(rule["alert_message"], "Safety violation at the gate");

    // The text file is kept on disk but never reaches the model
    assert_eq!(*generator.media_seen.lock().unwrap(), vec![1]);
    assert_eq!(files_in(dir.path()), 2);
}

#[tokio::test]
async fn test_uploads_removed_when_not_retained() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |c| {
        c.uploads.retain = false;
    })
    .await;

    let response = app
        .oneshot(generate_request(&[
            Part::Text("rule_name", "Gate safety"),
            Part::Text("rule_intent", "phone or no helmet"),
            Part::File {
                file_name: "clip.mp4",
                content_type: None,
                bytes: b"fake video",
            },
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn test_generate_rule_requires_intent() {
    let dir = tempfile::tempdir().unwrap();
    let generator = StubGenerator::answering(PHONE_OR_HELMET);
    let app = router_with(generator.clone(), dir.path(), |_| {}).await;

    let response = app
        .oneshot(generate_request(&[Part::Text("rule_name", "Gate safety")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("rule_intent"));
    assert!(generator.media_seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_answer_503_without_storing_files() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::unconfigured(), dir.path(), |_| {}).await;

    let response = app
        .oneshot(generate_request(&[
            Part::Text("rule_name", "Gate safety"),
            Part::Text("rule_intent", "phone use"),
            Part::File {
                file_name: "gate.png",
                content_type: Some("image/png"),
                bytes: b"png",
            },
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "configuration");
    assert_eq!(body["error"]["retryable"], false);
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn test_invalid_model_output_is_never_returned() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(CYCLIC), dir.path(), |_| {}).await;

    let response = app
        .oneshot(generate_request(&[
            Part::Text("rule_name", "Loop"),
            Part::Text("rule_intent", "worker is present"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "validation");
    assert_eq!(body["error"]["rule"], 6);
    assert!(body.get("trigger_logic").is_none());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |c| {
        c.uploads.max_request_bytes = 1024;
    })
    .await;

    let big = vec![0u8; 16 * 1024];
    let response = app
        .oneshot(generate_request(&[
            Part::Text("rule_name", "Gate safety"),
            Part::Text("rule_intent", "phone use"),
            Part::File {
                file_name: "huge.png",
                content_type: Some("image/png"),
                bytes: &big,
            },
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_validate_rule_returns_expressions() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |_| {}).await;

    let response = app
        .oneshot(json_request("/api/validate-rule", PHONE_OR_HELMET))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["rule"]["visual_detection"]["target_objects"][1], "phone");
    assert_eq!(body["expressions"][0]["root_id"], "or");
    assert_eq!(
        body["expressions"][0]["text"],
        "(worker is using a phone OR worker is not wearing a helmet)"
    );
    assert_eq!(body["expressions"][0]["tokens"][0]["type"], "open");
}

#[tokio::test]
async fn test_validate_rule_reports_failed_rule() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |_| {}).await;

    let response = app
        .clone()
        .oneshot(json_request("/api/validate-rule", CYCLIC))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["rule"], 6);

    let response = app
        .oneshot(json_request("/api/validate-rule", "{\"visual_detection\": 3}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |_| {}).await;

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(StubGenerator::answering(PHONE_OR_HELMET), dir.path(), |_| {}).await;

    let response = app
        .oneshot(Request::get("/v1/chat/completions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Full path through the OpenAI client against a loopback stand-in for the API
#[tokio::test]
async fn test_generate_rule_against_fake_model_endpoint() {
    use axum::routing::post;
    use axum::Json;

    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let recorder = seen.clone();
    let fake = Router::new().route(
        "/v1/chat/completions",
        post(move |Json(body): Json<Value>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(body);
                Json(json!({
                    "id": "chatcmpl-test",
                    "object": "chat.completion",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": PHONE_OR_HELMET},
                        "finish_reason": "stop"
                    }]
                }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, fake).await.unwrap();
    });

    let mut config = ServiceConfig::default();
    config.model.base_url = format!("http://{}/v1", addr);
    config.model.api_key = Some("sk-test".to_string());
    config.model.allow_local_endpoint = true;
    config.model.timeout_secs = 10;
    config.check().unwrap();

    let generator = Arc::new(OpenAiGenerator::new(&config.model).unwrap());
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(generator, dir.path(), |c| c.model = config.model.clone()).await;

    let response = app
        .oneshot(generate_request(&[
            Part::Text("rule_name", "Gate safety"),
            Part::Text("rule_intent", "phone or no helmet"),
            Part::File {
                file_name: "gate.jpg",
                content_type: Some("image/jpeg"),
                bytes: b"abc",
            },
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rule = body_json(response).await;
    assert_eq!(rule["trigger_logic"]["edges"].as_array().unwrap().len(), 2);

    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let content = &requests[0]["messages"][0]["content"];
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[1]["type"], "image_url");
    assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,YWJj");
    assert!((requests[0]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn test_model_timeout_is_gateway_timeout() {
    use axum::routing::post;
    use axum::Json;
    use std::time::Duration;

    let fake = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"choices": []}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, fake).await.unwrap();
    });

    let mut config = ServiceConfig::default();
    config.model.base_url = format!("http://{}/v1", addr);
    config.model.api_key = Some("sk-test".to_string());
    config.model.allow_local_endpoint = true;
    config.model.timeout_secs = 1;

    let generator = Arc::new(OpenAiGenerator::new(&config.model).unwrap());
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(generator, dir.path(), |c| c.model = config.model.clone()).await;

    let response = app
        .oneshot(generate_request(&[
            Part::Text("rule_name", "Gate safety"),
            Part::Text("rule_intent", "phone or no helmet"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "upstream");
    assert_eq!(body["error"]["upstream"], "timeout");
    assert_eq!(body["error"]["retryable"], true);
    assert!(body.get("trigger_logic").is_none());
    assert!(body["error"].get("trigger_logic").is_none());
}
