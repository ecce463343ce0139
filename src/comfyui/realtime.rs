//! ComfyUI realtime channel (`/ws?clientId=...`).
//!
//! A channel is opened with a hello frame and considered live once the
//! server answers with any frame. Completion is signalled by an `executing`
//! event with a null node, or `execution_success`, for the tracked prompt.
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{AppError, AppResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RealtimeChannel {
    client_id: String,
    ack: String,
    socket: Socket,
}

impl RealtimeChannel {
    /// Connect, send the hello and wait for one acknowledgment frame, all
    /// within `limit`.
    pub async fn connect(url: &str, client_id: &str, limit: Duration) -> AppResult<Self> {
        tracing::info!("Attempting to connect to {}", url);
        match tokio::time::timeout(limit, handshake(url, client_id)).await {
            Ok(Ok((socket, ack))) => {
                tracing::info!("Connected to ComfyUI with client_id: {}, response: {}", client_id, ack);
                Ok(RealtimeChannel { client_id: client_id.to_string(), ack, socket })
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to connect to {}: {}", url, e);
                Err(AppError::BackendUnavailable(format!("WebSocket connection failed: {}", e)))
            }
            Err(_) => {
                tracing::error!("Connecting to {} timed out after {:?}", url, limit);
                Err(AppError::BackendUnavailable(format!(
                    "WebSocket connection failed: timed out after {:?}",
                    limit
                )))
            }
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// First frame the server sent after the hello.
    pub fn ack(&self) -> &str {
        &self.ack
    }

    /// Block until the backend reports `prompt_id` finished, bounded by `limit`.
    pub async fn wait_for_completion(&mut self, prompt_id: &str, limit: Duration) -> AppResult<()> {
        match tokio::time::timeout(limit, self.next_completion(prompt_id)).await {
            Ok(Ok(())) => {
                tracing::info!("Prompt {} completed (realtime)", prompt_id);
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!("Realtime tracking of prompt {} failed: {}", prompt_id, e);
                Err(AppError::TrackingFailed(e))
            }
            Err(_) => Err(AppError::TrackingFailed(format!(
                "timed out after {:?} waiting for prompt {}",
                limit, prompt_id
            ))),
        }
    }

    async fn next_completion(&mut self, prompt_id: &str) -> Result<(), String> {
        loop {
            let text = match self.socket.next().await {
                None => return Err("realtime channel closed".to_string()),
                Some(Err(e)) => return Err(e.to_string()),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) => return Err("realtime channel closed by server".to_string()),
                // previews and keep-alives
                Some(Ok(_)) => continue,
            };
            if let Some(outcome) = completion_event(&text, prompt_id) {
                return outcome;
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!("Closing realtime channel for {}: {}", self.client_id, e);
        }
        tracing::info!("WebSocket connection closed for client_id: {}", self.client_id);
    }
}

async fn handshake(url: &str, client_id: &str) -> Result<(Socket, String), String> {
    let (mut socket, _response) = connect_async(url).await.map_err(|e| e.to_string())?;
    let hello = json!({ "type": "connect", "client_id": client_id }).to_string();
    socket.send(Message::Text(hello)).await.map_err(|e| e.to_string())?;
    match socket.next().await {
        Some(Ok(Message::Text(text))) => Ok((socket, text)),
        Some(Ok(Message::Close(_))) | None => Err("connection closed before acknowledgment".to_string()),
        Some(Ok(other)) => Ok((socket, format!("<{} byte frame>", other.len()))),
        Some(Err(e)) => Err(e.to_string()),
    }
}

/// `Some` when `text` settles the fate of `prompt_id`.
fn completion_event(text: &str, prompt_id: &str) -> Option<Result<(), String>> {
    let event: Value = serde_json::from_str(text).ok()?;
    let data = event.get("data")?;
    if data.get("prompt_id").and_then(Value::as_str) != Some(prompt_id) {
        return None;
    }
    match event.get("type").and_then(Value::as_str)? {
        "executing" if data.get("node").map_or(false, Value::is_null) => Some(Ok(())),
        "execution_success" => Some(Ok(())),
        "execution_error" => {
            let reason = data
                .get("exception_message")
                .and_then(Value::as_str)
                .unwrap_or("execution error");
            Some(Err(format!("prompt {} failed: {}", prompt_id, reason.trim())))
        }
        "execution_interrupted" => Some(Err(format!("prompt {} was interrupted", prompt_id))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Accepts one client, reports its hello, acks, then plays `script`.
    async fn spawn_backend(script: Vec<Value>) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (hello_tx, hello_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            if let Some(Ok(Message::Text(hello))) = ws.next().await {
                let _ = hello_tx.send(hello);
            }
            ws.send(Message::Text(json!({"type": "status", "data": {"sid": "s1"}}).to_string()))
                .await
                .unwrap();
            for frame in script {
                ws.send(Message::Text(frame.to_string())).await.unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        });
        (format!("ws://{}/ws?clientId=c-1", addr), hello_rx)
    }

    #[tokio::test]
    async fn test_connect_sends_hello_and_reads_ack() {
        let (url, hello) = spawn_backend(vec![]).await;
        let channel = RealtimeChannel::connect(&url, "c-1", Duration::from_secs(2)).await.unwrap();

        let hello: Value = serde_json::from_str(&hello.await.unwrap()).unwrap();
        assert_eq!(hello, json!({"type": "connect", "client_id": "c-1"}));
        assert!(channel.ack().contains("\"status\""));
        assert_eq!(channel.client_id(), "c-1");
        channel.close().await;
    }

    #[tokio::test]
    async fn test_wait_ignores_other_prompts_until_done() {
        let (url, _hello) = spawn_backend(vec![
            json!({"type": "executing", "data": {"node": null, "prompt_id": "other"}}),
            json!({"type": "progress", "data": {"value": 3, "max": 20, "prompt_id": "42"}}),
            json!({"type": "executing", "data": {"node": "9", "prompt_id": "42"}}),
            json!({"type": "executing", "data": {"node": null, "prompt_id": "42"}}),
        ])
        .await;
        let mut channel = RealtimeChannel::connect(&url, "c-1", Duration::from_secs(2)).await.unwrap();
        channel.wait_for_completion("42", Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_surfaces_execution_error() {
        let (url, _hello) = spawn_backend(vec![json!({
            "type": "execution_error",
            "data": {"prompt_id": "42", "exception_message": "CUDA out of memory\n"}
        })])
        .await;
        let mut channel = RealtimeChannel::connect(&url, "c-1", Duration::from_secs(2)).await.unwrap();
        let err = channel.wait_for_completion("42", Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, AppError::TrackingFailed(ref m) if m.contains("CUDA out of memory")));
    }

    #[tokio::test]
    async fn test_wait_times_out_without_event() {
        let (url, _hello) = spawn_backend(vec![]).await;
        let mut channel = RealtimeChannel::connect(&url, "c-1", Duration::from_secs(2)).await.unwrap();
        let err = channel.wait_for_completion("42", Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, AppError::TrackingFailed(_)));
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let url = format!("ws://{}/ws?clientId=c-1", addr);
        let err = RealtimeChannel::connect(&url, "c-1", Duration::from_millis(100)).await.err().unwrap();
        assert!(matches!(err, AppError::BackendUnavailable(ref m) if m.contains("timed out")));
    }

    #[test]
    fn completion_events_are_matched_by_prompt_id() {
        let done = json!({"type": "execution_success", "data": {"prompt_id": "a"}}).to_string();
        assert_eq!(completion_event(&done, "a"), Some(Ok(())));
        assert_eq!(completion_event(&done, "b"), None);
        assert_eq!(completion_event("not json", "a"), None);
        let interrupted = json!({"type": "execution_interrupted", "data": {"prompt_id": "a"}}).to_string();
        assert!(matches!(completion_event(&interrupted, "a"), Some(Err(_))));
    }
}
