use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::instrument;

pub use bpr_error::{BprError, Result};

mod collector;
pub use collector::{collect_stream, CollectedResponse, StreamOutcome};

/// One incremental unit of text from the backend, already narrowed to its
/// textual payload. Empty payloads are legal and carry no text.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Issue a prompt and stream the completion back chunk by chunk.
    async fn chat_stream(&self, prompt: &str) -> Result<ChunkStream>;
}

// ========== OpenAI-compatible (covers OpenAI, DeepSeek, Azure AI gateways) ==========

#[derive(Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String,   // e.g. https://api.openai.com
    pub api_key: String,    // Bearer token
    pub chat_model: String, // e.g. deepseek-chat
    /// Skip TLS certificate verification. Required by gateways fronted by
    /// self-signed certificates.
    pub insecure_skip_verify: bool,
}

#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    cfg: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(cfg: OpenAiCompatConfig) -> Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(cfg.insecure_skip_verify)
            .build()
            .map_err(|e| BprError::Configuration {
                key: "http_client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, cfg })
    }
}

#[derive(Serialize)]
struct OaiChatReqMsg {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OaiChatReq {
    model: String,
    messages: Vec<OaiChatReqMsg>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Narrow one inbound chunk to its textual payload.
///
/// Chunks arrive in more than one shape depending on the gateway: the usual
/// chat-completion delta, a full message object, a mapping with a bare
/// `content` key, or a plain string. Whichever shape arrives, the text is
/// pulled out here so the streaming loop never inspects transport encodings;
/// a chunk with no text narrows to the empty string.
pub fn chunk_text(chunk: &serde_json::Value) -> String {
    if let Some(s) = chunk.as_str() {
        return s.to_string();
    }
    for path in [
        "/choices/0/delta/content",
        "/choices/0/message/content",
        "/content",
    ] {
        if let Some(s) = chunk.pointer(path).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    String::new()
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    #[instrument(skip(self, prompt))]
    async fn chat_stream(&self, prompt: &str) -> Result<ChunkStream> {
        let url = format!(
            "{}/v1/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let body = OaiChatReq {
            model: self.cfg.chat_model.clone(),
            messages: vec![OaiChatReqMsg {
                role: "user".into(),
                content: prompt.to_string(),
            }],
            stream: true,
            temperature: Some(0.2),
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BprError::Network {
                operation: "http_request".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(BprError::LlmService {
                provider: "openai_compat".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(100);
        let mut byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            // SSE lines can be split across network chunks; keep the
            // unterminated tail until the rest arrives.
            let mut pending = String::new();
            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        pending.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = pending.find('\n') {
                            let line: String = pending.drain(..=pos).collect();
                            let line = line.trim();
                            let Some(data) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let data = data.trim();
                            if data == "[DONE]" {
                                return;
                            }
                            let payload = match serde_json::from_str::<serde_json::Value>(data)
                            {
                                Ok(value) => chunk_text(&value),
                                // not JSON: the gateway sent the text itself
                                Err(_) => data.to_string(),
                            };
                            if tx.send(Ok(payload)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(BprError::LlmService {
                                provider: "openai_compat".to_string(),
                                message: e.to_string(),
                                retry_after: None,
                            }))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
