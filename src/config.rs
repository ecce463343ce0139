//! Env-driven configuration for the service and library.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults are provided for convenience during development.
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Request body cap for the multipart routes.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// How GenerateImage waits for a submitted job to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Poll `/history/{prompt_id}` until the job shows up.
    Poll,
    /// Subscribe on the realtime channel before submitting.
    Realtime,
}

impl FromStr for WaitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" | "polling" => Ok(WaitStrategy::Poll),
            "realtime" | "ws" | "websocket" => Ok(WaitStrategy::Realtime),
            other => Err(format!("unknown wait strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub comfyui_url: String,
    pub comfyui_ws_url: Option<String>,
    pub prompts_dir: String,
    pub workflow_template: String,
    pub api_host: String,
    pub api_port: String,
    pub request_timeout: Duration,
    pub ws_connect_timeout: Duration,
    pub poll_interval: Duration,
    pub track_timeout: Duration,
    pub wait_strategy: WaitStrategy,
    pub inference_url: String,
    pub inference_api_name: String,
    pub hf_token: Option<String>,
    /// Covers a whole refinement call, including the event stream.
    pub inference_timeout: Duration,
    pub refine_retry_delay: Duration,
    pub news_url: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> Result<Self, env::VarError> {
        let prompts_dir = var_or("PROMPTS_DIR", "./prompts");
        let workflow_template = env::var("WORKFLOW_TEMPLATE")
            .unwrap_or_else(|_| format!("{}/tutorial.json", prompts_dir.trim_end_matches('/')));
        Ok(Config {
            comfyui_url: var_or("COMFYUI_URL", "http://localhost:8188"),
            comfyui_ws_url: env::var("COMFYUI_WS_URL").ok().filter(|u| !u.trim().is_empty()),
            prompts_dir,
            workflow_template,
            api_host: var_or("API_HOST", "127.0.0.1"),
            api_port: var_or("API_PORT", "8189"),
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 10)),
            ws_connect_timeout: Duration::from_secs(parse_or("WS_CONNECT_TIMEOUT_SECS", 5)),
            poll_interval: Duration::from_millis(parse_or("POLL_INTERVAL_MS", 1000)),
            track_timeout: Duration::from_secs(parse_or("TRACK_TIMEOUT_SECS", 300)),
            wait_strategy: parse_or("WAIT_STRATEGY", WaitStrategy::Poll),
            inference_url: var_or("INFERENCE_URL", "https://atharva-dev-prompt-generator.hf.space"),
            inference_api_name: var_or("INFERENCE_API_NAME", "generate"),
            hf_token: env::var("HF_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            inference_timeout: Duration::from_secs(parse_or("INFERENCE_TIMEOUT_SECS", 120)),
            refine_retry_delay: Duration::from_millis(parse_or("REFINE_RETRY_DELAY_MS", 5000)),
            news_url: var_or("NEWS_URL", "https://news.google.com"),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    pub fn log_summary(&self) {
        tracing::info!("COMFYUI_URL: {}", self.comfyui_url);
        if let Some(ws) = &self.comfyui_ws_url {
            tracing::info!("COMFYUI_WS_URL: {}", ws);
        }
        tracing::info!("PROMPTS_DIR: {}", self.prompts_dir);
        tracing::info!("WORKFLOW_TEMPLATE: {}", self.workflow_template);
        tracing::info!("API_HOST: {} API_PORT: {}", self.api_host, self.api_port);
        tracing::info!("WAIT_STRATEGY: {:?}", self.wait_strategy);
        tracing::info!("INFERENCE_URL: {}", self.inference_url);
        tracing::info!("HF_TOKEN: {}", if self.hf_token.is_some() { "<set>" } else { "<unset>" });
        tracing::info!("NEWS_URL: {}", self.news_url);
        tracing::info!("MAX_UPLOAD_BYTES: {}", self.max_upload_bytes);
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr + std::fmt::Debug>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} '{}', falling back to {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
