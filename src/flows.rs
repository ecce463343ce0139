//! End-to-end flows composed from the prompt constructor, the refinement
//! client, the ComfyUI client and the news client.
//!
//! The default workflow template is read once and kept immutable; every flow
//! that needs it works on its own clone.
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::comfyui::types::allowed_extension;
use crate::comfyui::{Artifact, ComfyUIClient, ImageRef, ImageUpload, RealtimeChannel, Submission, UploadedImage};
use crate::config::{Config, WaitStrategy};
use crate::error::{AppError, AppResult};
use crate::inference::{PromptPair, PromptRefiner};
use crate::prompt::{CaptionRequest, PostRequest, PostType, PromptConstructor, PromptForm};
use crate::trends::{NewsClient, NewsResponse, TrendsQuery};
use crate::workflow::graph;

/// Node whose `SaveImage` output GenerateImage returns.
pub const OUTPUT_NODE_ID: &str = "9";
/// `LoadImage` nodes of the inpainting workflow.
pub const INPAINT_IMAGE_NODE: &str = "58";
pub const INPAINT_MASK_NODE: &str = "62";
pub const DEFAULT_FILENAME_PREFIX: &str = "Relay";

const NO_TEMPLATE: &str = "No workflow_data in request and no workflow template loaded";

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub prompts_dir: String,
    pub wait_strategy: WaitStrategy,
    pub poll_interval: Duration,
    pub track_timeout: Duration,
    pub ws_connect_timeout: Duration,
}

impl From<&Config> for RelaySettings {
    fn from(config: &Config) -> Self {
        RelaySettings {
            prompts_dir: config.prompts_dir.clone(),
            wait_strategy: config.wait_strategy,
            poll_interval: config.poll_interval,
            track_timeout: config.track_timeout,
            ws_connect_timeout: config.ws_connect_timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPrompt {
    pub generated_prompt: String,
    pub positive: String,
    pub negative: String,
    pub workflow_data: Option<Value>,
}

/// Body of `/generate_image`: an explicit graph, or post fields to refine
/// into the default template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub workflow_data: Option<Value>,
    #[serde(flatten)]
    pub post: PostRequest,
}

/// Body of `/queue_prompt`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueuePromptRequest {
    pub workflow_data: Option<Value>,
    pub prompt: Option<Value>,
    pub workflow: Option<String>,
    pub text_positive: Option<String>,
    pub text_negative: Option<String>,
    pub sets: Vec<String>,
    pub filename_prefix: Option<String>,
    pub verbose: bool,
    /// Remaining keys; the known sampler parameters among them are applied.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub message: String,
    pub client_id: String,
    pub server_address: String,
}

#[derive(Clone)]
pub struct Relay {
    comfyui: ComfyUIClient,
    refiner: PromptRefiner,
    news: NewsClient,
    constructor: PromptConstructor,
    template: Option<Arc<Value>>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(
        comfyui: ComfyUIClient,
        refiner: PromptRefiner,
        news: NewsClient,
        template: Option<Value>,
        settings: RelaySettings,
    ) -> Self {
        Relay {
            comfyui,
            refiner,
            news,
            constructor: PromptConstructor::new(),
            template: template.map(Arc::new),
            settings,
        }
    }

    /// Build every collaborator from `config` and load the default template.
    /// A missing template is logged; flows that need it fail per request.
    pub async fn from_config(config: &Config) -> Self {
        let template = match graph::load_graph(&config.workflow_template).await {
            Ok(template) => {
                tracing::info!("Loaded workflow template {}", config.workflow_template);
                Some(template)
            }
            Err(e) => {
                tracing::warn!("No default workflow template: {}", e);
                None
            }
        };
        let mut comfyui = ComfyUIClient::new(config.comfyui_url.clone(), config.request_timeout);
        if let Some(ws) = &config.comfyui_ws_url {
            comfyui = comfyui.with_ws_base(ws.clone());
        }
        Relay::new(
            comfyui,
            PromptRefiner::from_config(config),
            NewsClient::new(config.news_url.clone(), config.request_timeout),
            template,
            RelaySettings::from(config),
        )
    }

    pub fn template(&self) -> Option<&Value> {
        self.template.as_deref()
    }

    fn client_for(&self, server_address: Option<&str>) -> ComfyUIClient {
        match server_address.map(str::trim).filter(|s| !s.is_empty()) {
            Some(address) => self.comfyui.for_server(address),
            None => self.comfyui.clone(),
        }
    }

    async fn refined_pair(&self, request: &PostRequest) -> AppResult<PromptPair> {
        let prompt = self.constructor.construct_prompt(request)?;
        tracing::debug!("Assembled prompt ({} chars): {}", prompt.len(), prompt);
        Ok(self.refiner.refine(&prompt).await)
    }

    /// Assemble, refine and patch the result into a copy of the template.
    pub async fn generate_prompt(&self, request: &PostRequest) -> AppResult<GeneratedPrompt> {
        let pair = self.refined_pair(request).await?;
        let workflow_data = self.template().map(|base| {
            let mut graph = base.clone();
            graph::apply_prompt_text(&mut graph, Some(&pair.positive), Some(&pair.negative));
            graph
        });
        tracing::info!("Generated prompt for post_type {:?}", request.post_type);
        Ok(GeneratedPrompt {
            generated_prompt: pair.display_text(),
            positive: pair.positive,
            negative: pair.negative,
            workflow_data,
        })
    }

    /// Queue → wait → fetch the first output image.
    pub async fn generate_image(&self, request: GenerateImageRequest) -> AppResult<Artifact> {
        let graph = match request.workflow_data {
            Some(graph) => graph::unwrap_graph(graph),
            None => {
                let mut graph = self
                    .template()
                    .cloned()
                    .ok_or_else(|| AppError::InvalidInput(NO_TEMPLATE.to_string()))?;
                if request.post.post_type.is_some() {
                    let pair = self.refined_pair(&request.post).await?;
                    graph::apply_prompt_text(&mut graph, Some(&pair.positive), Some(&pair.negative));
                }
                graph
            }
        };
        if !graph.is_object() {
            return Err(AppError::InvalidInput("workflow_data must be a job graph object".to_string()));
        }
        self.run_job(&graph).await
    }

    /// Submit `graph`, wait with the configured strategy and fetch its output.
    pub async fn run_job(&self, graph: &Value) -> AppResult<Artifact> {
        let client_id = Uuid::new_v4().to_string();
        let prompt_id = match self.settings.wait_strategy {
            WaitStrategy::Poll => self.comfyui.queue_prompt(graph, &client_id).await?.prompt_id,
            WaitStrategy::Realtime => {
                let url = self.comfyui.ws_url(&client_id);
                let mut channel = RealtimeChannel::connect(&url, &client_id, self.settings.ws_connect_timeout)
                    .await
                    .map_err(|e| AppError::TrackingFailed(e.to_string()))?;
                let outcome = self.submit_on_channel(&mut channel, graph).await;
                channel.close().await;
                outcome?
            }
        };

        tracing::info!("Tracking progress for Prompt ID: {}", prompt_id);
        let manifest = self
            .comfyui
            .track_progress(&prompt_id, self.settings.poll_interval, self.settings.track_timeout)
            .await?;
        let image = first_output_image(&manifest, &prompt_id)?;
        let artifact = self.comfyui.fetch_output(&image).await?;
        tracing::info!("Returning image with filename: {}", artifact.filename);
        Ok(artifact)
    }

    async fn submit_on_channel(&self, channel: &mut RealtimeChannel, graph: &Value) -> AppResult<String> {
        let submission = self.comfyui.queue_prompt(graph, channel.client_id()).await?;
        channel
            .wait_for_completion(&submission.prompt_id, self.settings.track_timeout)
            .await?;
        Ok(submission.prompt_id)
    }

    /// Resolve the graph for `/queue_prompt` and apply every override.
    pub async fn build_queue_graph(&self, request: &QueuePromptRequest) -> AppResult<Value> {
        let mut graph = match (&request.workflow_data, &request.prompt, &request.workflow) {
            (Some(graph), _, _) | (None, Some(graph), _) => graph::unwrap_graph(graph.clone()),
            (None, None, Some(name)) => graph::load_named(&self.settings.prompts_dir, name).await?,
            (None, None, None) => return Err(AppError::InvalidInput("Missing required parameters".to_string())),
        };
        if !graph.is_object() {
            return Err(AppError::InvalidInput("Missing required parameters".to_string()));
        }

        graph::apply_params(&mut graph, &request.params);
        if request.text_positive.is_some() || request.text_negative.is_some() {
            graph::apply_prompt_text(&mut graph, request.text_positive.as_deref(), request.text_negative.as_deref());
        }
        for (path, value) in graph::parse_set_pairs(&request.sets)? {
            let relative = match path.split_first() {
                Some((head, rest)) if head == "prompt" => rest,
                _ => &path[..],
            };
            if !graph::apply_set_path(&mut graph, relative, value) {
                return Err(AppError::InvalidInput(format!("Cannot apply override to path '{}'", path.join("."))));
            }
        }
        graph::ensure_filename_prefix(&mut graph, request.filename_prefix.as_deref().unwrap_or(DEFAULT_FILENAME_PREFIX));

        if request.verbose {
            let body = json!({ "prompt": &graph });
            tracing::info!(%body, "Constructed request body");
        }
        Ok(graph)
    }

    pub async fn queue_prompt(&self, request: &QueuePromptRequest) -> AppResult<Submission> {
        let graph = self.build_queue_graph(request).await?;
        self.comfyui.queue_prompt(&graph, &Uuid::new_v4().to_string()).await
    }

    /// Upload image and mask, splice their stored names into the inpainting
    /// graph and submit it. Returns the submit acknowledgment without waiting.
    pub async fn inpaint(&self, graph_file: &[u8], image: ImageUpload, mask: ImageUpload) -> AppResult<Value> {
        let parsed: Value = serde_json::from_slice(graph_file)
            .map_err(|_| AppError::InvalidInput("Invalid JSON file".to_string()))?;
        let mut graph = graph::unwrap_graph(parsed);
        graph::require_node_inputs(&graph, INPAINT_IMAGE_NODE)?;
        graph::require_node_inputs(&graph, INPAINT_MASK_NODE)?;
        allowed_extension(&image.filename)?;
        allowed_extension(&mask.filename)?;

        let (stored_image, stored_mask) =
            tokio::try_join!(self.comfyui.upload_image(image), self.comfyui.upload_image(mask))?;
        tracing::info!("Uploaded image: {}, mask: {}", stored_image.name, stored_mask.name);

        graph::set_node_input(&mut graph, INPAINT_IMAGE_NODE, "image", json!(stored_image.name))?;
        graph::set_node_input(&mut graph, INPAINT_MASK_NODE, "image", json!(stored_mask.name))?;

        let submission = self.comfyui.queue_prompt(&graph, &Uuid::new_v4().to_string()).await?;
        Ok(submission.raw)
    }

    pub async fn history(&self, server_address: Option<&str>) -> AppResult<Value> {
        self.client_for(server_address).get_history().await
    }

    pub async fn progress(&self, prompt_id: &str, server_address: Option<&str>) -> AppResult<ProgressResponse> {
        self.client_for(server_address)
            .track_progress(prompt_id, self.settings.poll_interval, self.settings.track_timeout)
            .await?;
        Ok(ProgressResponse {
            status: "completed".to_string(),
            message: format!("Prompt {} completed", prompt_id),
        })
    }

    pub async fn image(&self, filename: &str, server_address: Option<&str>) -> AppResult<Artifact> {
        if filename.trim().is_empty() {
            return Err(AppError::InvalidInput("Filename is required".to_string()));
        }
        self.client_for(server_address).get_image(filename).await
    }

    pub async fn upload(&self, upload: ImageUpload, server_address: Option<&str>) -> AppResult<UploadedImage> {
        self.client_for(server_address).upload_image(upload).await
    }

    /// Open the realtime channel, complete the handshake and close it again.
    /// Bare host overrides are reached over `wss://`.
    pub async fn connect_check(&self, server_address: Option<&str>) -> AppResult<ConnectionInfo> {
        let client_id = Uuid::new_v4().to_string();
        let address = server_address.map(str::trim).filter(|s| !s.is_empty());
        let (url, reported) = match address {
            Some(addr) if !addr.contains("://") => (
                format!("wss://{}/ws?clientId={}", addr.trim_end_matches('/'), client_id),
                addr.to_string(),
            ),
            Some(addr) => (self.comfyui.for_server(addr).ws_url(&client_id), addr.to_string()),
            None => (self.comfyui.ws_url(&client_id), self.comfyui.base_url().to_string()),
        };
        let channel = RealtimeChannel::connect(&url, &client_id, self.settings.ws_connect_timeout).await?;
        channel.close().await;
        Ok(ConnectionInfo {
            message: "Successfully connected to ComfyUI".to_string(),
            client_id,
            server_address: reported,
        })
    }

    pub async fn trends(&self, query: &TrendsQuery) -> AppResult<NewsResponse> {
        self.news.headlines(query).await
    }

    pub async fn trends_by_topic(&self, topic: &str, query: &TrendsQuery) -> AppResult<NewsResponse> {
        self.news.by_topic(topic, query).await
    }

    pub fn post_types(&self) -> Vec<&'static str> {
        PostType::ALL.iter().map(|t| t.as_str()).collect()
    }

    pub fn prompt_form(&self, post_type: &str) -> AppResult<PromptForm> {
        Ok(self.constructor.form(post_type.parse()?))
    }

    pub fn caption_prompt(&self, request: &CaptionRequest) -> String {
        self.constructor.caption_prompt(request)
    }
}

/// `manifest[prompt_id].outputs[OUTPUT_NODE_ID].images[0]`
fn first_output_image(manifest: &Value, prompt_id: &str) -> AppResult<ImageRef> {
    let image = manifest
        .get(prompt_id)
        .and_then(|entry| entry.get("outputs"))
        .and_then(|outputs| outputs.get(OUTPUT_NODE_ID))
        .and_then(|node| node.get("images"))
        .and_then(|images| images.get(0))
        .ok_or_else(|| {
            AppError::MalformedManifest(format!(
                "no image at outputs.{}.images[0] for prompt {}",
                OUTPUT_NODE_ID, prompt_id
            ))
        })?;
    serde_json::from_value(image.clone()).map_err(|e| AppError::MalformedManifest(e.to_string()))
}
