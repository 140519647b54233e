//! HTTP client the CLI uses to talk to a running service instance.
//!
//! Calls apply a short timeout, and a refused connection is reported as the
//! service being unavailable — the caller's job is to degrade gracefully
//! (print guidance to start the service), never to crash.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{CreateSkillInput, CreateTaskInput};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the service at all; it is not running.
    #[error("service unavailable: {0}")]
    Unavailable(reqwest::Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server error: {0}")]
    Server(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ClientError::Unavailable(e)
        } else {
            ClientError::Server(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HealthInfo {
    pub ok: bool,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct AddedResponse {
    pub id: i64,
    pub added: String,
}

#[derive(Debug, Clone)]
pub struct AgentClient {
    base_url: String,
    client: reqwest::Client,
}

impl AgentClient {
    pub fn for_port(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{}", port))
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub async fn health(&self) -> Result<HealthInfo, ClientError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        handle_response(response).await
    }

    pub async fn add_task(&self, input: &CreateTaskInput) -> Result<AddedResponse, ClientError> {
        let response = self
            .client
            .post(format!("{}/tasks", self.base_url))
            .json(input)
            .send()
            .await?;
        handle_response(response).await
    }

    pub async fn add_skill(&self, input: &CreateSkillInput) -> Result<AddedResponse, ClientError> {
        let response = self
            .client
            .post(format!("{}/skills", self.base_url))
            .json(input)
            .send()
            .await?;
        handle_response(response).await
    }

    pub async fn summary(&self) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        struct SummaryResponse {
            summary: String,
        }
        let response = self
            .client
            .get(format!("{}/summary", self.base_url))
            .send()
            .await?;
        let body: SummaryResponse = handle_response(response).await?;
        Ok(body.summary)
    }
}

/// Convert HTTP status classes into client errors, passing the structured
/// error body through.
async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else {
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(body)),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ClientError::BadRequest(body))
            }
            _ => Err(ClientError::Server(format!("{}: {}", status, body))),
        }
    }
}
