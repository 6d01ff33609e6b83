//! Generative score summarization
//!
//! Posts a prose prompt built from the analysis payload to a
//! generateContent-style endpoint and returns the model's text. Disabled
//! (and cheaply so) when no API key is configured.

use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use nota_common::ServiceConfig;

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("Summarization is not configured (no API key)")]
    NotConfigured,

    #[error("Summarization request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Summarization response had no text candidates")]
    EmptyResponse,
}

pub struct Summarizer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl Summarizer {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.summarizer_endpoint.clone(),
            api_key: config.summarizer_api_key.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Produce a short listener-facing summary of one analyzed score
    pub async fn summarize(
        &self,
        title: &str,
        analysis: &serde_json::Value,
    ) -> Result<String, SummarizerError> {
        if !self.is_enabled() {
            return Err(SummarizerError::NotConfigured);
        }

        let prompt = build_prompt(title, analysis);
        debug!(chars = prompt.len(), "Requesting score summary");

        let body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        let response: serde_json::Value = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(SummarizerError::EmptyResponse)
    }
}

fn build_prompt(title: &str, analysis: &serde_json::Value) -> String {
    format!(
        "You are a music librarian. Using the following automated analysis of \
         the score \"{}\", write a 2-3 sentence summary for a listener: name \
         the likely key, ensemble, and character, and mention anything notable. \
         Do not mention that the data came from automated analysis.\n\n\
         Analysis data:\n{}",
        title, analysis
    )
}
