//! Dense embeddings for index entries.
//!
//! When `[embedding]` names a provider, the index adapter embeds each
//! rendered text before it is written, filling the collection's `vector`
//! field. With the provider `disabled` the collection is created without a
//! dense field and nothing is embedded.
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | `openai` | `POST https://api.openai.com/v1/embeddings` (needs `OPENAI_API_KEY`) |
//! | `ollama` | `POST {url}/api/embed` (default `http://localhost:11434`) |
//!
//! # Retry strategy
//!
//! - HTTP 429 and 5xx: retry with exponential backoff (1s, 2s, 4s, … capped at 32s)
//! - Other 4xx: fail immediately
//! - Network errors: retry

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenAI,
    Ollama,
}

impl Provider {
    fn label(self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Ollama => "Ollama",
        }
    }
}

/// A configured embedding backend.
pub struct Embedder {
    provider: Provider,
    model: String,
    dims: usize,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

impl Embedder {
    /// `Ok(None)` when the provider is `disabled`.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>> {
        let provider = match config.provider.as_str() {
            "disabled" => return Ok(None),
            "openai" => Provider::OpenAI,
            "ollama" => Provider::Ollama,
            other => bail!("Unknown embedding provider: {}", other),
        };
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for {}", provider.label()))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {}", provider.label()))?;

        let (endpoint, api_key) = match provider {
            Provider::OpenAI => {
                let key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
                (OPENAI_URL.to_string(), Some(key))
            }
            Provider::Ollama => {
                let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
                (format!("{}/api/embed", base.trim_end_matches('/')), None)
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            provider,
            model,
            dims,
            endpoint,
            api_key,
            max_retries: config.max_retries,
            client,
        }))
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// One vector per input text, in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.post_with_retry(&body).await?;
        let vectors = match self.provider {
            Provider::OpenAI => parse_openai_response(&json)?,
            Provider::Ollama => parse_ollama_response(&json)?,
        };
        if vectors.len() != texts.len() {
            bail!(
                "{} returned {} embeddings for {} texts",
                self.provider.label(),
                vectors.len(),
                texts.len()
            );
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
            bail!(
                "{} returned a {}-dimensional embedding, expected {}",
                self.provider.label(),
                v.len(),
                self.dims
            );
        }
        Ok(vectors)
    }

    async fn post_with_retry(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let label = self.provider.label();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, provider = label, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut req = self.client.post(&self.endpoint).json(body);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                        continue;
                    }
                    bail!("{} API error {}: {}", label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "{} connection error ({}): {}",
                        label,
                        self.endpoint,
                        e
                    ));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", label)))
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, to_vector(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(to_vector)
        .collect()
}

fn to_vector(value: &serde_json::Value) -> Result<Vec<f32>> {
    let arr = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("embedding is not an array"))?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("embedding contains a non-number"))
        })
        .collect()
}
