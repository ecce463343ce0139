//! Thin HTTP client for ComfyUI endpoints.
//!
//! - `queue_prompt` posts `{prompt, client_id}` to `/prompt`.
//! - `get_history` / `get_history_for` read `/history`.
//! - `track_progress` polls `/history/{prompt_id}` until the job appears.
//! - `get_image` / `fetch_output` proxy `/view` and return raw bytes.
//! - `upload_image` posts multipart data to `/upload/{image_type}`.
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};

use super::types::{allowed_extension, Artifact, ImageRef, ImageUpload, Submission, UploadedImage};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    ws_base: Option<String>,
}

impl ComfyUIClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client for ComfyUI: {}", e);
            Client::new()
        });
        ComfyUIClient { client, base_url: normalize_base(&base_url, "http"), ws_base: None }
    }

    /// Reach the realtime channel at `ws_base` instead of deriving it from the REST base.
    pub fn with_ws_base(mut self, ws_base: String) -> Self {
        self.ws_base = Some(normalize_base(&ws_base, "ws"));
        self
    }

    /// Same client pointed at another server. Bare hosts are reached over `http://`.
    pub fn for_server(&self, server_address: &str) -> Self {
        ComfyUIClient {
            client: self.client.clone(),
            base_url: normalize_base(server_address, "http"),
            ws_base: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Realtime endpoint for `client_id`; `https` bases map to `wss`.
    pub fn ws_url(&self, client_id: &str) -> String {
        let ws_base = if let Some(base) = &self.ws_base {
            base.clone()
        } else if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/ws?clientId={}", ws_base, client_id)
    }

    /// Queue a job graph with ComfyUI.
    ///
    /// Fails with `SubmitFailed` on transport errors, non-2xx statuses and
    /// responses without a `prompt_id`.
    pub async fn queue_prompt(&self, graph: &Value, client_id: &str) -> AppResult<Submission> {
        let url = format!("{}/prompt", self.base_url);
        let node_count = graph.as_object().map(|o| o.len()).unwrap_or(0);
        tracing::info!("Sending prompt to ComfyUI at URL: {} ({} nodes, client_id {})", url, node_count, client_id);

        let response = self.client.post(&url)
            .json(&json!({ "prompt": graph, "client_id": client_id }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach {}: {}", url, e);
                AppError::SubmitFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
            let error_message = format!("Status: {}, Body: {}", status, error_body);
            tracing::error!("Failed to queue prompt at {}. {}", url, error_message);
            return Err(AppError::SubmitFailed(error_message));
        }

        let raw: Value = response.json().await.map_err(|e| AppError::SubmitFailed(e.to_string()))?;
        let prompt_id = match raw.get("prompt_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                tracing::error!("ComfyUI accepted the prompt but returned no prompt_id: {}", raw);
                return Err(AppError::SubmitFailed("Failed to get prompt_id from ComfyUI".to_string()));
            }
        };
        tracing::info!("Successfully queued prompt {}", prompt_id);
        Ok(Submission { prompt_id, raw })
    }

    /// Retrieve the full execution history as JSON.
    pub async fn get_history(&self) -> AppResult<Value> {
        self.get_json(format!("{}/history", self.base_url)).await
    }

    /// History restricted to one job; `{}` while the job is still running.
    pub async fn get_history_for(&self, prompt_id: &str) -> AppResult<Value> {
        self.get_json(format!("{}/history/{}", self.base_url, prompt_id)).await
    }

    async fn get_json(&self, url: String) -> AppResult<Value> {
        let response = self.client.get(&url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach {}: {}", url, e);
                AppError::BackendUnavailable(e.to_string())
            })?;

        if response.status().is_success() {
            response.json().await.map_err(|e| AppError::BackendUnavailable(e.to_string()))
        } else {
            tracing::error!("GET {} returned {}", url, response.status());
            Err(AppError::BackendUnavailable(format!("Failed to get {}: {:?}", url, response.status())))
        }
    }

    /// Poll until `prompt_id` shows up in the history and return that
    /// history document (the result manifest).
    ///
    /// Bounded by `limit`; backend-reported failures and transport errors
    /// surface as `TrackingFailed`.
    pub async fn track_progress(&self, prompt_id: &str, interval: Duration, limit: Duration) -> AppResult<Value> {
        tokio::time::timeout(limit, self.poll_history(prompt_id, interval)).await.map_err(|_| {
            tracing::error!("Timed out after {:?} waiting for prompt {}", limit, prompt_id);
            AppError::TrackingFailed(format!("timed out after {:?} waiting for prompt {}", limit, prompt_id))
        })?
    }

    async fn poll_history(&self, prompt_id: &str, interval: Duration) -> AppResult<Value> {
        loop {
            let history = self.get_history_for(prompt_id).await.map_err(|e| AppError::TrackingFailed(e.to_string()))?;
            if let Some(entry) = history.get(prompt_id) {
                check_job_status(prompt_id, entry)?;
                tracing::info!("Prompt {} completed", prompt_id);
                return Ok(history);
            }
            tracing::debug!("Prompt {} still running", prompt_id);
            tokio::time::sleep(interval).await;
        }
    }

    /// Fetch image bytes by filename via ComfyUI's `/view` endpoint.
    pub async fn get_image(&self, filename: &str) -> AppResult<Artifact> {
        self.view(&[("filename", filename)], filename).await
    }

    /// Fetch an output referenced by a history manifest.
    pub async fn fetch_output(&self, image: &ImageRef) -> AppResult<Artifact> {
        let query = [
            ("filename", image.filename.as_str()),
            ("subfolder", image.subfolder.as_str()),
            ("type", image.folder_type.as_str()),
        ];
        self.view(&query, &image.filename).await
    }

    async fn view(&self, query: &[(&str, &str)], filename: &str) -> AppResult<Artifact> {
        let url = format!("{}/view", self.base_url);
        let response = self.client.get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach {} for {}: {}", url, filename, e);
                AppError::FetchFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!("Fetching {} from {} returned {}", filename, url, response.status());
            return Err(AppError::FetchFailed(format!("Failed to get image: {:?}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| AppError::FetchFailed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(AppError::FetchFailed(format!("ComfyUI returned an empty body for {}", filename)));
        }
        Ok(Artifact { filename: filename.to_string(), bytes: bytes.to_vec() })
    }

    /// Upload an image into one of ComfyUI's folders.
    ///
    /// The extension is validated before anything is sent.
    pub async fn upload_image(&self, upload: ImageUpload) -> AppResult<UploadedImage> {
        let ext = allowed_extension(&upload.filename)?;
        let mime = if ext == "jpg" { "image/jpeg".to_string() } else { format!("image/{}", ext) };
        let url = format!("{}/upload/{}", self.base_url, upload.image_type);
        tracing::info!("Uploading {} ({} bytes) to {}", upload.filename, upload.bytes.len(), url);

        let part = Part::bytes(upload.bytes)
            .file_name(upload.filename.clone())
            .mime_str(&mime)
            .map_err(|e| AppError::UploadFailed(e.to_string()))?;
        let form = Form::new()
            .part("image", part)
            .text("type", upload.folder_type)
            .text("overwrite", if upload.overwrite { "true" } else { "false" });

        let response = self.client.post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach {}: {}", url, e);
                AppError::UploadFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Upload of {} failed. Status: {}, Body: {}", upload.filename, status, body);
            return Err(AppError::UploadFailed(format!("Status: {}, Body: {}", status, body)));
        }
        response.json::<UploadedImage>().await.map_err(|e| {
            AppError::UploadFailed(format!("unexpected upload response: {}", e))
        })
    }
}

fn normalize_base(address: &str, default_scheme: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("{}://{}", default_scheme, trimmed)
    }
}

fn check_job_status(prompt_id: &str, entry: &Value) -> AppResult<()> {
    let status = entry.get("status");
    if status.and_then(|s| s.get("status_str")).and_then(Value::as_str) == Some("error") {
        let messages = status
            .and_then(|s| s.get("messages"))
            .map(|m| m.to_string())
            .unwrap_or_default();
        tracing::error!("ComfyUI reported failure for prompt {}: {}", prompt_id, messages);
        return Err(AppError::TrackingFailed(format!("prompt {} failed: {}", prompt_id, messages)));
    }
    Ok(())
}
