use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::check_status;
use crate::config::Settings;
use crate::error::CatalogError;

pub const API_KEY_VAR: &str = "DEEPSEEK_API";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// OpenAI-compatible chat completions endpoint, JSON-object replies only.
pub struct DeepSeek {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl DeepSeek {
    pub fn new(client: reqwest::Client, settings: &Settings, api_key: String) -> Self {
        Self {
            client,
            url: format!(
                "{}/chat/completions",
                settings.deepseek_base_url.trim_end_matches('/')
            ),
            model: settings.deepseek_model.clone(),
            api_key,
        }
    }

    /// Read the bearer token from `DEEPSEEK_API`.
    pub fn from_env(client: reqwest::Client, settings: &Settings) -> Result<Self, CatalogError> {
        let key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CatalogError::MissingApiKey { var: API_KEY_VAR })?;
        Ok(Self::new(client, settings, key))
    }

    pub async fn chat_json(&self, system: &str, user: &str) -> Result<Value> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            stream: false,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CatalogError::Llm(format!("Request failed: {}", e)))?;
        let reply: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .context("Invalid JSON from DeepSeek")?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CatalogError::Llm("DeepSeek returned no choices".into()))?;
        debug!("DeepSeek reply: {} chars", content.len());
        serde_json::from_str(&content).context("DeepSeek reply is not a JSON object")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let body = ChatRequest {
            model: "deepseek-chat",
            messages: [
                Message {
                    role: "system",
                    content: "s",
                },
                Message {
                    role: "user",
                    content: "u",
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            stream: false,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["response_format"]["type"], "json_object");
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["stream"], false);
    }

    #[test]
    fn endpoint_from_settings() {
        let settings = Settings {
            deepseek_base_url: "https://api.example.com/".into(),
            ..Settings::default()
        };
        let ds = DeepSeek::new(reqwest::Client::new(), &settings, "k".into());
        assert_eq!(ds.url, "https://api.example.com/chat/completions");
    }
}
