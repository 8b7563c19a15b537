//! Minimal Ollama client for our use-cases.
//!
//! We only call the local chat and generate endpoints with `stream: false`
//! and treat the reply as opaque display text. Calls are instrumented and
//! log model name, latency, and response sizes (not contents).
//!
//! Failure contract: transport errors and non-success statuses surface a
//! single user-facing message; no retry.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Ollama {
  pub client: reqwest::Client,
  pub base_url: String,
  pub model: String,
}

impl Ollama {
  /// Construct the client from env. Returns None when OLLAMA_DISABLED is set
  /// (the server then degrades assessment to an "unavailable" status) or the
  /// HTTP client cannot be built.
  pub fn from_env() -> Option<Self> {
    if matches!(std::env::var("OLLAMA_DISABLED").as_deref(), Ok("1") | Ok("true")) {
      return None;
    }
    let base_url =
      std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".into());
    let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".into());

    // Local generation is slow; give the model room without hanging forever.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(180))
      .build()
      .ok()?;

    Some(Self { client, base_url, model })
  }

  /// Chat completion: POST /api/chat with a single user message.
  /// Returns the reply's `message.content`.
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  pub async fn chat(&self, prompt: &str) -> Result<String, String> {
    let url = format!("{}/api/chat", self.base_url);
    let req = ChatRequest {
      model: self.model.clone(),
      messages: vec![ChatMessage { role: "user".into(), content: prompt.into() }],
      stream: false,
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "speaking-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_ollama_error(&body).unwrap_or(body);
      return Err(format!("Ollama HTTP {}: {}", status, msg));
    }

    let body: ChatResponse = res.json().await.map_err(|e| e.to_string())?;
    let text = body.message.map(|m| m.content).unwrap_or_default().trim().to_string();
    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Ollama chat reply received");
    Ok(text)
  }

  /// Plain completion: POST /api/generate. Returns the `response` field.
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  pub async fn generate(&self, prompt: &str) -> Result<String, String> {
    let url = format!("{}/api/generate", self.base_url);
    let req = GenerateRequest { model: self.model.clone(), prompt: prompt.into(), stream: false };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "speaking-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_ollama_error(&body).unwrap_or(body);
      return Err(format!("Ollama HTTP {}: {}", status, msg));
    }

    let body: GenerateResponse = res.json().await.map_err(|e| e.to_string())?;
    let text = body.response.trim().to_string();
    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Ollama generate reply received");
    Ok(text)
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct ChatRequest {
  model: String,
  messages: Vec<ChatMessage>,
  stream: bool,
}
#[derive(Serialize)]
struct ChatMessage {
  role: String,
  content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  message: Option<ChatMessageResp>,
}
#[derive(Deserialize)]
struct ChatMessageResp {
  content: String,
}

#[derive(Serialize)]
struct GenerateRequest {
  model: String,
  prompt: String,
  stream: bool,
}
#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  response: String,
}

/// Try to extract a clean error message from an Ollama error body.
fn extract_ollama_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error)
}
