use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::BackendConfig;

use super::ApiError;

/// Rating question chosen by the backend, with the visitor it was chosen for.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub question: String,
    #[serde(default, deserialize_with = "loose_text")]
    pub hn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSubmission {
    pub hn: String,
    pub status: String,
    pub rating: u8,
    pub comment: String,
}

/// The backend endpoints the kiosk talks to.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn trigger_qr(&self, hn: &str) -> Result<(), ApiError>;
    async fn fetch_question(&self) -> Result<Question, ApiError>;
    async fn submit_rating(&self, submission: &RatingSubmission) -> Result<(), ApiError>;
    async fn fetch_patient(&self, code: &str) -> Result<Value, ApiError>;
}

pub struct BackendClient {
    http: Client,
    base: Url,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let base = Url::parse(config.base())
            .with_context(|| format!("invalid api base {}", config.api_base))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("api base {} cannot carry paths", config.api_base));
        }

        Ok(Self { http, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_json(&self, segments: &[&str], body: &Value) -> Result<(), ApiError> {
        let response = self.http.post(self.endpoint(segments)).json(body).send().await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let response = self
            .http
            .get(self.endpoint(segments))
            .header("Cache-Control", "no-store")
            .send()
            .await?;
        let response = ensure_success(response).await?;
        response.json().await.map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn trigger_qr(&self, hn: &str) -> Result<(), ApiError> {
        self.post_json(&["trigger", "qr"], &json!({ "hn": hn })).await
    }

    async fn fetch_question(&self) -> Result<Question, ApiError> {
        self.get_json(&["api", "question"]).await
    }

    async fn submit_rating(&self, submission: &RatingSubmission) -> Result<(), ApiError> {
        let body = serde_json::to_value(submission).map_err(|err| ApiError::Decode(err.to_string()))?;
        self.post_json(&["api", "submit"], &body).await
    }

    async fn fetch_patient(&self, code: &str) -> Result<Value, ApiError> {
        self.get_json(&["api", "patient", code]).await
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status(status.as_u16()))
    }
}

fn loose_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}
