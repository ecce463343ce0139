use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Request, StatusCode};
use axum::Router;
use hyper::Body;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use comfyui_post_relay::api::{router, AppState};
use comfyui_post_relay::config::{WaitStrategy, DEFAULT_MAX_UPLOAD_BYTES};
use comfyui_post_relay::flows::{Relay, RelaySettings};
use comfyui_post_relay::inference::PromptRefiner;
use comfyui_post_relay::trends::NewsClient;
use comfyui_post_relay::ComfyUIClient;

const BOUNDARY: &str = "relay-test-boundary";

fn app(server: &MockServer, template: Option<Value>) -> Router {
    let timeout = Duration::from_secs(5);
    let relay = Relay::new(
        ComfyUIClient::new(server.uri(), timeout),
        PromptRefiner::new(server.uri(), "generate".into(), timeout).with_retry_delay(Duration::from_millis(1)),
        NewsClient::new(server.uri(), timeout),
        template,
        RelaySettings {
            prompts_dir: "./prompts".into(),
            wait_strategy: WaitStrategy::Poll,
            poll_interval: Duration::from_millis(5),
            track_timeout: Duration::from_secs(5),
            ws_connect_timeout: Duration::from_secs(1),
        },
    );
    router(Arc::new(AppState { relay, max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES }))
}

fn graph() -> Value {
    json!({
        "3": {"class_type": "KSampler", "inputs": {"positive": ["6", 0], "negative": ["7", 0]}},
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI"}}
    })
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// `(name, filename, content)` parts as a multipart/form-data request.
fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, f
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes()),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_and_post_types() {
    let server = MockServer::start().await;
    let app = app(&server, None);

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"message": "ComfyUI post relay"}));

    let response = app.oneshot(get("/post-types")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"post_types": ["festival", "product_launch", "event", "achievement", "hiring", "trending"]})
    );
}

#[tokio::test]
async fn test_unknown_post_type_is_bad_request() {
    let server = MockServer::start().await;
    let response = app(&server, None)
        .oneshot(json_request("POST", "/generate_prompt", json!({"post_type": "wedding"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(response).await["detail"].as_str().unwrap_or_default().to_string();
    assert!(detail.contains("wedding"), "{}", detail);
}

#[tokio::test]
async fn test_prompt_form_lists_fields() {
    let server = MockServer::start().await;
    let response = app(&server, None)
        .oneshot(get("/generate_prompt_form?post_type=festival"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let form = body_json(response).await;
    assert_eq!(form["post_type"], "festival");
    assert!(form["required_fields"].as_array().is_some());
}

#[tokio::test]
async fn test_generate_image_streams_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompt_id": "42", "number": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "42": {"outputs": {"9": {"images": [{"filename": "out.png", "subfolder": "", "type": "output"}]}}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "out.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG-bytes".to_vec()))
        .mount(&server)
        .await;

    let response = app(&server, None)
        .oneshot(json_request("POST", "/generate_image", json!({"workflow_data": graph()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "attachment; filename=\"out.png\"");
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    assert_eq!(bytes.as_ref(), b"\x89PNG-bytes");
}

#[tokio::test]
async fn test_submit_failure_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad graph"))
        .mount(&server)
        .await;

    let response = app(&server, None)
        .oneshot(json_request("POST", "/generate_image", json!({"workflow_data": graph()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body_json(response).await["detail"].as_str().unwrap_or_default().to_string();
    assert!(detail.starts_with("Error queuing prompt"), "{}", detail);
}

#[tokio::test]
async fn test_queue_prompt_reports_id_and_requires_graph() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"prompt_id": "q-7"})))
        .mount(&server)
        .await;
    let app = app(&server, None);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/queue_prompt", json!({"prompt": graph(), "seed": 3})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"message": "Prompt queued successfully", "prompt_id": "q-7"})
    );

    let response = app.oneshot(json_request("POST", "/queue_prompt", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"detail": "Missing required parameters"}));
}

#[tokio::test]
async fn test_history_and_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"abc": {"outputs": {}}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"abc": {"outputs": {}}})))
        .mount(&server)
        .await;
    let app = app(&server, None);

    let response = app.clone().oneshot(get("/get_history")).await.unwrap();
    assert_eq!(body_json(response).await, json!({"all_prompts": {"abc": {"outputs": {}}}}));

    let response = app.oneshot(get("/track_progress/abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "completed", "message": "Prompt abc completed"})
    );
}

#[tokio::test]
async fn test_get_image_requires_filename() {
    let server = MockServer::start().await;
    let response = app(&server, None).oneshot(get("/get_image")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trends_without_articles_is_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>empty</title></channel></rss>"#,
        ))
        .mount(&server)
        .await;

    let response = app(&server, None).oneshot(get("/fetch_trends/nothing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = multipart_request("/upload_image", &[("image", Some("notes.txt"), b"hello")]);
    let response = app(&server, None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_forwards_to_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "logo.png", "subfolder": "", "type": "input"})))
        .expect(1)
        .mount(&server)
        .await;

    let request = multipart_request(
        "/upload_image",
        &[("image", Some("logo.png"), b"\x89PNG"), ("overwrite", None, b"true")],
    );
    let response = app(&server, None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"name": "logo.png", "subfolder": "", "type": "input"}));
}

#[tokio::test]
async fn test_inpaint_rejects_invalid_json() {
    let server = MockServer::start().await;
    let request = multipart_request(
        "/inpaint",
        &[
            ("prompt_file", Some("workflow.json"), b"{nope"),
            ("image", Some("photo.png"), b"img"),
            ("mask", Some("mask.png"), b"mask"),
        ],
    );
    let response = app(&server, None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"detail": "Invalid JSON file"}));
}

#[tokio::test]
async fn test_caption_prompt_embeds_both_prompts() {
    let server = MockServer::start().await;
    let response = app(&server, None)
        .oneshot(json_request(
            "POST",
            "/generate_caption_and_hashtags",
            json!({"positive_prompt": "neon skyline", "negative_prompt": "blur"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let prompt = body_json(response).await["generated_prompt"].as_str().unwrap_or_default().to_string();
    assert!(prompt.contains("neon skyline"));
    assert!(prompt.contains("blur"));
}

#[tokio::test]
async fn test_upload_accepts_images_over_two_megabytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "big.png", "subfolder": "", "type": "input"})))
        .expect(1)
        .mount(&server)
        .await;

    let photo = vec![7u8; 3 * 1024 * 1024];
    let request = multipart_request("/upload_image", &[("image", Some("big.png"), photo.as_slice())]);
    let response = app(&server, None).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "big.png");
}

#[tokio::test]
async fn test_mistyped_json_body_uses_detail_contract() {
    let server = MockServer::start().await;
    let response = app(&server, None)
        .oneshot(json_request("POST", "/generate_image", json!({"post_type": 5})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().is_some(), "{}", body);
}

#[tokio::test]
async fn test_malformed_query_uses_detail_contract() {
    let server = MockServer::start().await;
    let response = app(&server, None).oneshot(get("/trends?limit=abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().is_some(), "{}", body);
}

#[tokio::test]
async fn test_get_image_sanitizes_disposition_filename() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "evil\"name.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
        .mount(&server)
        .await;

    let response = app(&server, None)
        .oneshot(get("/get_image?filename=evil%22name.png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "attachment; filename=\"evil_name.png\"");
}
