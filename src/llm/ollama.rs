use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{check_status, clean_reply};
use crate::error::CatalogError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

pub struct Ollama {
    client: reqwest::Client,
    host: String,
}

impl Ollama {
    pub fn new(client: reqwest::Client, host: &str) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        }
    }

    /// Installed models; also serves as the availability check.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(|e| {
                CatalogError::Llm(format!("Ollama is not available at {}: {}", self.host, e))
            })?;
        let tags: TagsResponse = check_status(response)
            .await?
            .json()
            .await
            .context("Invalid JSON from Ollama")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// `wanted` if installed, otherwise the first installed model.
    pub async fn resolve_model(&self, wanted: &str) -> Result<String> {
        let models = self.list_models().await?;
        pick_model(wanted, &models)
    }

    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.1,
                top_p: 0.9,
            },
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&body)
            .send()
            .await
            .map_err(|e| CatalogError::Llm(format!("Request failed: {}", e)))?;
        let reply: GenerateResponse = check_status(response)
            .await?
            .json()
            .await
            .context("Invalid JSON from Ollama")?;
        Ok(clean_reply(&reply.response))
    }
}

fn pick_model(wanted: &str, models: &[String]) -> Result<String> {
    if models.iter().any(|m| m == wanted) {
        info!("Using model: {}", wanted);
        return Ok(wanted.to_string());
    }
    match models.first() {
        Some(first) => {
            warn!("Model '{}' not found, using {}", wanted, first);
            Ok(first.clone())
        }
        None => Err(CatalogError::Llm("no Ollama models installed".into()).into()),
    }
}
