//! Axum request handlers for the HTTP API.
//!
//! Extractors are wrapped in `WithRejection` so malformed bodies, queries and
//! paths answer with the shared `{"detail"}` error body.
use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::routes::AppState;
use crate::comfyui::{Artifact, ImageUpload};
use crate::error::{AppError, AppResult};
use crate::flows::{GenerateImageRequest, QueuePromptRequest};
use crate::prompt::{CaptionRequest, PostRequest};
use crate::trends::TrendsQuery;

type JsonBody<T> = WithRejection<Json<T>, AppError>;
type QueryParams<T> = WithRejection<Query<T>, AppError>;
type PathParam<T> = WithRejection<Path<T>, AppError>;
type Params = QueryParams<HashMap<String, String>>;
type Form = WithRejection<Multipart, AppError>;

pub async fn root() -> Json<Value> {
    Json(json!({"message": "ComfyUI post relay"}))
}

pub async fn queue_prompt(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(request), _): JsonBody<QueuePromptRequest>,
) -> AppResult<Json<Value>> {
    let submission = state.relay.queue_prompt(&request).await?;
    tracing::info!("Queued prompt {}", submission.prompt_id);
    Ok(Json(json!({
        "message": "Prompt queued successfully",
        "prompt_id": submission.prompt_id,
    })))
}

pub async fn generate_prompt(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(request), _): JsonBody<PostRequest>,
) -> AppResult<Json<Value>> {
    let generated = state.relay.generate_prompt(&request).await?;
    Ok(Json(json!(generated)))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(params), _): Params,
) -> AppResult<Json<Value>> {
    let history = state.relay.history(params.get("server_address").map(String::as_str)).await?;
    Ok(Json(json!({ "all_prompts": history })))
}

pub async fn track_progress(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(prompt_id), _): PathParam<String>,
    WithRejection(Query(params), _): Params,
) -> AppResult<Json<Value>> {
    let progress = state
        .relay
        .progress(&prompt_id, params.get("server_address").map(String::as_str))
        .await?;
    Ok(Json(json!(progress)))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(params), _): Params,
) -> AppResult<Response> {
    let filename = params
        .get("filename")
        .ok_or_else(|| AppError::InvalidInput("Filename is required".to_string()))?;
    let artifact = state
        .relay
        .image(filename, params.get("server_address").map(String::as_str))
        .await?;
    Ok(image_response(artifact))
}

pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(request), _): JsonBody<GenerateImageRequest>,
) -> AppResult<Response> {
    let artifact = state.relay.generate_image(request).await?;
    Ok(image_response(artifact))
}

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    WithRejection(mut multipart, _): Form,
) -> AppResult<Json<Value>> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let original = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(bad_multipart)?;
            file = Some((original, bytes.to_vec()));
        } else {
            fields.insert(name, field.text().await.map_err(bad_multipart)?);
        }
    }

    let (original, bytes) = file.ok_or_else(|| AppError::InvalidInput("Missing 'image' file".to_string()))?;
    let filename = fields
        .get("filename")
        .filter(|f| !f.trim().is_empty())
        .cloned()
        .or(original)
        .ok_or_else(|| AppError::InvalidInput("Missing filename".to_string()))?;
    let upload = ImageUpload {
        filename,
        bytes,
        folder_type: fields.get("folder_type").cloned().unwrap_or_else(|| "input".to_string()),
        image_type: fields.get("image_type").cloned().unwrap_or_else(|| "image".to_string()),
        overwrite: fields.get("overwrite").map_or(false, |v| v.eq_ignore_ascii_case("true") || v == "1"),
    };

    let stored = state
        .relay
        .upload(upload, fields.get("server_address").map(String::as_str))
        .await?;
    Ok(Json(json!(stored)))
}

pub async fn generate_caption(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(request), _): JsonBody<CaptionRequest>,
) -> Json<Value> {
    Json(json!({ "generated_prompt": state.relay.caption_prompt(&request) }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub server_address: Option<String>,
}

pub async fn connect_to_comfy(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ConnectRequest>>,
) -> AppResult<Json<Value>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let info = state.relay.connect_check(request.server_address.as_deref()).await?;
    Ok(Json(json!(info)))
}

pub async fn inpaint(
    State(state): State<Arc<AppState>>,
    WithRejection(mut multipart, _): Form,
) -> AppResult<Json<Value>> {
    let mut prompt_file = None;
    let mut image = None;
    let mut mask = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();
        match name.as_str() {
            "prompt_file" => prompt_file = Some(bytes),
            "image" => image = Some(ImageUpload::input(filename, bytes)),
            "mask" => mask = Some(ImageUpload::input(filename, bytes)),
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let missing = |part: &str| AppError::InvalidInput(format!("Missing '{}' part", part));
    let prompt_file = prompt_file.ok_or_else(|| missing("prompt_file"))?;
    let image = image.ok_or_else(|| missing("image"))?;
    let mask = mask.ok_or_else(|| missing("mask"))?;

    let ack = state.relay.inpaint(&prompt_file, image, mask).await?;
    Ok(Json(ack))
}

pub async fn post_types(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "post_types": state.relay.post_types() }))
}

pub async fn prompt_form(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(params), _): Params,
) -> AppResult<Json<Value>> {
    let post_type = params.get("post_type").map(String::as_str).unwrap_or_default();
    let form = state.relay.prompt_form(post_type)?;
    Ok(Json(json!(form)))
}

pub async fn trends(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): QueryParams<TrendsQuery>,
) -> AppResult<Json<Value>> {
    let news = state.relay.trends(&query).await?;
    Ok(Json(json!(news)))
}

pub async fn fetch_trends(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(topic_name), _): PathParam<String>,
    WithRejection(Query(query), _): QueryParams<TrendsQuery>,
) -> AppResult<Json<Value>> {
    let news = state.relay.trends_by_topic(&topic_name, &query).await?;
    Ok(Json(json!(news)))
}

fn image_response(artifact: Artifact) -> Response {
    let headers = [
        (header::CONTENT_TYPE, artifact.content_type().to_string()),
        (header::CONTENT_DISPOSITION, attachment(&artifact.filename)),
    ];
    (headers, artifact.bytes).into_response()
}

/// `attachment; filename="..."` with quotes, backslashes and control
/// characters replaced so the header stays well formed.
fn attachment(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::InvalidInput(format!("Invalid multipart body: {}", e))
}
