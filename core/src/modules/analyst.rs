use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::core::error::{AuditError, Result};
use crate::AuditConfig;

/// Turns a dumped excerpt into a natural-language summary.
///
/// Best effort: callers report failures and move on.
#[async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn analyze(&self, database: &str, excerpt: &str) -> Result<String>;
}

/// Builds the analyst prompt for one database excerpt.
pub fn build_prompt(database: &str, excerpt: &str) -> String {
    format!(
        "You are a cybersecurity analyst reviewing data dumped from a SQL database named '{}'. \
         Below is an excerpt of the raw scanner output:\n\n{}\n\n\
         Summarize it concisely. Name the tables and describe what kind of data was exposed \
         (for example user credentials, personal information, system configuration). \
         Do not list individual rows; summarize the data types found.",
        database, excerpt
    )
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// `AnalysisSink` backed by an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaAnalyst {
    http: Client,
    endpoint: String,
    model: String,
}

impl OllamaAnalyst {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| AuditError::AnalysisUnavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        Self::new(&config.analysis_url, &config.model, config.analysis_timeout_duration())
    }
}

#[async_trait]
impl AnalysisSink for OllamaAnalyst {
    async fn analyze(&self, database: &str, excerpt: &str) -> Result<String> {
        debug!("requesting analysis of '{}' ({} chars) from {}", database, excerpt.len(), self.endpoint);

        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(database, excerpt),
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AuditError::AnalysisUnavailable(format!("network error: {} (is the model server running?)", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::AnalysisUnavailable(format!("server returned {}: {}", status, body.trim())));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AuditError::AnalysisUnavailable(format!("unreadable response: {}", e)))?;

        let text = body.response.trim().to_string();
        if text.is_empty() {
            return Err(AuditError::AnalysisUnavailable("empty response".into()));
        }
        Ok(text)
    }
}

/// Stands in for the analyst when analysis is switched off. Every call fails
/// with `AnalysisUnavailable`, so extracted databases still report the stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalyst;

#[async_trait]
impl AnalysisSink for DisabledAnalyst {
    async fn analyze(&self, database: &str, _excerpt: &str) -> Result<String> {
        debug!("analysis of '{}' skipped: disabled", database);
        Err(AuditError::AnalysisUnavailable("analysis disabled".into()))
    }
}
