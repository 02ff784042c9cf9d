use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use sales_insights::{
    build_router, config::Config, error::AppError, services::llm_agent::AnalysisTransport, AppState,
};

const SALES_CSV: &str = "Date,Product,Revenue\n\
2024-01-05,Widget,$100\n\
2024-01-20,Gadget,50\n\
2024-02-03,Widget,$200\n";

const REPLY: &str = "STATS_JSON:{\"metric1_label\":\"Total Revenue\",\"metric1_value\":\"$350\"}\n\
\n\
**EXECUTIVE SUMMARY**\n\
Widgets carry the business.\n\
\n\
**TOP 5 RECOMMENDATIONS**\n\
1. Raise Widget prices\n\
2. Bundle Gadgets\n\
\n\
**QUICK WINS**\n\
- Email past buyers\n";

/// Replies from a fixed script and counts calls.
struct FakeTransport {
    reply: Result<String, fn() -> AppError>,
    calls: AtomicUsize,
    prompts: parking_lot::Mutex<Vec<String>>,
}

impl FakeTransport {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            prompts: parking_lot::Mutex::new(Vec::new()),
        })
    }

    fn failing(err: fn() -> AppError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            calls: AtomicUsize::new(0),
            prompts: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AnalysisTransport for FakeTransport {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(make) => Err(make()),
        }
    }
}

fn app(transport: Arc<FakeTransport>) -> Router {
    let config = Config {
        max_file_size: 1024,
        ..Config::default()
    };
    build_router(Arc::new(AppState::new(config, transport)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Body, json_body: bool) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if json_body {
        request = request.header("content-type", "application/json");
    }
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn upload(app: &Router, file_name: &str, data: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/sheets?file_name={}", file_name),
        Body::from(data.to_string()),
        false,
    )
    .await
}

async fn analyze(app: &Router, id: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/sheets/{}/analyze", id),
        Body::from(body.to_string()),
        true,
    )
    .await
}

#[tokio::test]
async fn health_is_ok() {
    let app = app(FakeTransport::replying(""));
    let (status, body) = send(&app, Method::GET, "/health", Body::empty(), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn upload_analyze_report_delete() {
    let transport = FakeTransport::replying(REPLY);
    let app = app(transport.clone());

    let (status, body) = upload(&app, "sales.csv", SALES_CSV).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["row_count"], 3);
    assert_eq!(body["column_count"], 3);
    assert_eq!(body["preview"].as_array().unwrap().len(), 3);
    assert_eq!(body["columns"][2]["roles"], json!(["numeric"]));
    assert_eq!(body["charts"]["bar"]["points"][0], json!({"key": "Widget", "value": 300.0}));
    let id = body["session_id"].as_str().unwrap().to_string();

    let (status, snapshot) = send(&app, Method::GET, &format!("/sheets/{}", id), Body::empty(), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["status"], "ready");

    let (status, _) = send(&app, Method::GET, &format!("/sheets/{}/report", id), Body::empty(), false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, result) = analyze(&app, &id, json!({"industry": "retail", "period": "last_month", "company_name": "Acme"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["stats"]["revenue"]["value"], "$350");
    assert_eq!(result["recommendations"], json!(["Raise Widget prices", "Bundle Gadgets"]));
    assert_eq!(result["sections"]["quick_wins"], "- Email past buyers");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert!(transport.prompts.lock()[0].contains("Company: Acme."));

    let (status, report) = send(&app, Method::GET, &format!("/sheets/{}/report", id), Body::empty(), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["source_file"], "sales.csv");
    assert_eq!(report["company_name"], "Acme");
    assert_eq!(report["blocks"][0]["title"], "EXECUTIVE SUMMARY");
    assert_eq!(report["blocks"][1]["items"][1]["marker"], "02");
    assert_eq!(report["footer"], "SalesAI Analyzer  ·  Page {page} of {total}  ·  Confidential");

    let (status, _) = send(&app, Method::DELETE, &format!("/sheets/{}", id), Body::empty(), false).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, Method::GET, &format!("/sheets/{}", id), Body::empty(), false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "session_not_found");
}

#[tokio::test]
async fn bad_uploads_fail_before_any_model_call() {
    let transport = FakeTransport::replying(REPLY);
    let app = app(transport.clone());

    let (status, body) = upload(&app, "notes.pdf", SALES_CSV).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["code"], "unsupported_format");

    let (status, body) = upload(&app, "empty.csv", "Product,Revenue\n").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "empty_or_invalid_input");

    let (status, body) = upload(&app, "big.csv", &"x".repeat(2000)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "file_too_large");

    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_credential_keeps_the_table() {
    let app = app(FakeTransport::failing(|| AppError::MissingCredential("ANTHROPIC_API_KEY".into())));

    let (_, body) = upload(&app, "sales.csv", SALES_CSV).await;
    let id = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = analyze(&app, &id, json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "missing_credential");

    let (_, snapshot) = send(&app, Method::GET, &format!("/sheets/{}", id), Body::empty(), false).await;
    assert_eq!(snapshot["status"], "failed");
    assert_eq!(snapshot["row_count"], 3);
    assert_eq!(snapshot["has_analysis"], false);

    let (status, charts) = send(&app, Method::GET, &format!("/sheets/{}/charts", id), Body::empty(), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(charts["line"]["kind"], "line_by_period");
}

#[tokio::test]
async fn remote_failure_is_reported_distinctly() {
    let app = app(FakeTransport::failing(|| AppError::RemoteFailure("API error: 529".into())));

    let (_, body) = upload(&app, "sales.csv", SALES_CSV).await;
    let id = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = analyze(&app, &id, json!({"industry": "tech"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "remote_failure");
    assert_eq!(body["error"], "API error: 529");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = app(FakeTransport::replying(REPLY));
    let id = uuid::Uuid::new_v4();

    let (status, body) = analyze(&app, &id.to_string(), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "session_not_found");
}

#[tokio::test]
async fn replacing_a_sheet_resets_its_analysis() {
    let app = app(FakeTransport::replying(REPLY));

    let (_, body) = upload(&app, "sales.csv", SALES_CSV).await;
    let id = body["session_id"].as_str().unwrap().to_string();
    let (status, _) = analyze(&app, &id, json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/sheets/{}?file_name=other.csv", id),
        Body::from("Region,Sales\nNorth,10\n"),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row_count"], 1);
    assert_eq!(body["charts"]["bar"]["points"][0]["key"], "North");

    let (_, snapshot) = send(&app, Method::GET, &format!("/sheets/{}", id), Body::empty(), false).await;
    assert_eq!(snapshot["status"], "ready");
    assert_eq!(snapshot["file_name"], "other.csv");
    assert_eq!(snapshot["has_analysis"], false);
}

#[tokio::test]
async fn company_name_is_trimmed_once_for_prompt_and_report() {
    let transport = FakeTransport::replying(REPLY);
    let app = app(transport.clone());

    let (_, body) = upload(&app, "sales.csv", SALES_CSV).await;
    let id = body["session_id"].as_str().unwrap().to_string();
    let (status, _) = analyze(&app, &id, json!({"company_name": "  Acme  "})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(transport.prompts.lock()[0].contains("Company: Acme."));

    let (_, report) = send(&app, Method::GET, &format!("/sheets/{}/report", id), Body::empty(), false).await;
    assert_eq!(report["company_name"], "Acme");
}
