pub mod deepseek;
pub mod ollama;

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

use crate::error::CatalogError;

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// Shared client for every model call; requests go out one at a time.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Drop reasoning blocks and surrounding quotes from a model reply.
pub fn clean_reply(raw: &str) -> String {
    THINK_RE
        .replace_all(raw, "")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Turn a non-2xx response into an `Llm` error carrying the body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(CatalogError::Llm(format!("API error ({}): {}", status, text)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_cleanup() {
        assert_eq!(clean_reply("<think>\nhmm\n</think>\n\"Data Science\"\n"), "Data Science");
        assert_eq!(clean_reply("'Ethics'"), "Ethics");
        assert_eq!(clean_reply("plain"), "plain");
    }
}
