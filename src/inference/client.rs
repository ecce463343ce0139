//! Client for the hosted prompt-refinement model.
//!
//! The endpoint speaks the Gradio "call" protocol: `POST /call/{api}` queues
//! the input and returns an `event_id`, then `GET /call/{api}/{event_id}`
//! streams server-sent events until a `complete` (or `error`) event.
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::Error::StreamEnded;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::config::Config;

pub const MAX_ATTEMPTS: usize = 3;
pub const FALLBACK_POSITIVE: &str =
    "Dynamic social media post, bold colors, modern typography, engaging composition";
pub const FALLBACK_NEGATIVE: &str = "Blurry text, low contrast, cluttered design, outdated style";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPair {
    pub positive: String,
    pub negative: String,
}

impl PromptPair {
    pub fn fallback() -> Self {
        PromptPair {
            positive: FALLBACK_POSITIVE.to_string(),
            negative: FALLBACK_NEGATIVE.to_string(),
        }
    }

    /// `Positive:\n...\n\nNegative:\n...`
    pub fn display_text(&self) -> String {
        format!("Positive:\n{}\n\nNegative:\n{}", self.positive, self.negative)
    }
}

#[derive(Deserialize)]
struct QueuedCall {
    event_id: String,
}

#[derive(Clone)]
pub struct PromptRefiner {
    client: Client,
    base_url: String,
    api_name: String,
    token: Option<String>,
    retry_delay: Duration,
}

impl PromptRefiner {
    pub fn new(base_url: String, api_name: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client for inference: {}", e);
            Client::new()
        });
        PromptRefiner {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_name: api_name.trim_matches('/').to_string(),
            token: None,
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut refiner = PromptRefiner::new(
            config.inference_url.clone(),
            config.inference_api_name.clone(),
            config.inference_timeout,
        )
        .with_retry_delay(config.refine_retry_delay);
        if let Some(token) = &config.hf_token {
            refiner = refiner.with_token(token.clone());
        }
        refiner
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Turn an assembled prompt into a positive/negative pair.
    ///
    /// Tries up to [`MAX_ATTEMPTS`] times with a fixed, non-blocking delay
    /// between attempts. Never fails: exhaustion yields [`PromptPair::fallback`].
    pub async fn refine(&self, prompt: &str) -> PromptPair {
        let strategy = FixedInterval::new(self.retry_delay).take(MAX_ATTEMPTS - 1);
        let mut attempt = 0usize;
        let result = Retry::spawn(strategy, move || {
            attempt += 1;
            let current = attempt;
            async move {
                self.request_once(prompt).await.map_err(|e| {
                    tracing::warn!("Refinement attempt {}/{} failed: {}", current, MAX_ATTEMPTS, e);
                    e
                })
            }
        })
        .await;

        match result {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(
                    "Prompt refinement failed after {} attempts: {}. Using fallback prompts.",
                    MAX_ATTEMPTS,
                    e
                );
                PromptPair::fallback()
            }
        }
    }

    async fn request_once(&self, prompt: &str) -> Result<PromptPair, String> {
        let call_url = format!("{}/call/{}", self.base_url, self.api_name);
        let response = self
            .authorized(self.client.post(&call_url))
            .json(&json!({ "data": [prompt] }))
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", call_url, e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{} returned {}: {}", call_url, status, body));
        }
        let queued: QueuedCall = response
            .json()
            .await
            .map_err(|e| format!("invalid queue response from {}: {}", call_url, e))?;

        let result_url = format!("{}/{}", call_url, queued.event_id);
        let mut events = EventSource::new(self.authorized(self.client.get(&result_url)))
            .map_err(|e| format!("cannot stream {}: {}", result_url, e))?;
        let outcome = loop {
            match events.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => match message.event.as_str() {
                    "complete" => break pair_from_data(&message.data),
                    "error" => break Err(format!("endpoint reported an error: {}", message.data)),
                    _ => continue,
                },
                Some(Err(StreamEnded)) | None => break Err("event stream ended without a result".to_string()),
                Some(Err(e)) => break Err(format!("event stream from {} failed: {}", result_url, e)),
            }
        };
        events.close();
        outcome
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn pair_from_data(data: &str) -> Result<PromptPair, String> {
    let values: Vec<Value> =
        serde_json::from_str(data).map_err(|e| format!("unexpected result payload: {}", e))?;
    match (values.first().and_then(Value::as_str), values.get(1).and_then(Value::as_str)) {
        (Some(positive), Some(negative)) => Ok(PromptPair {
            positive: positive.to_string(),
            negative: negative.to_string(),
        }),
        _ => Err(format!("expected [positive, negative], got {}", data)),
    }
}
