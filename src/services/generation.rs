use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Text-generation capability invoked by each pipeline stage.
///
/// Output is free text: prose for the summary stage, text expected (but not
/// guaranteed) to contain a JSON array for the flashcard and quiz stages.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError>;

    /// Model identifier recorded on artifact metadata rows.
    fn model_name(&self) -> &str;
}

/// Client for Cloudflare Workers AI text-generation models.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
    model: String,
}

#[derive(Deserialize)]
struct TextGenResponse {
    result: TextGenResult,
}

#[derive(Deserialize)]
struct TextGenResult {
    response: String,
}

impl WorkersAiClient {
    pub fn new(
        account_id: String,
        api_token: String,
        model: String,
        timeout_secs: u64,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(GenerationError::Http)?;

        Ok(Self {
            http,
            account_id,
            api_token,
            model,
        })
    }
}

#[async_trait]
impl TextGenerator for WorkersAiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, self.model
        );

        let request_body = serde_json::json!({
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "max_tokens": 2048
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await
            .map_err(GenerationError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let gen_resp: TextGenResponse = response.json().await.map_err(GenerationError::Http)?;

        let text = gen_resp.result.response;
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }

        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Workers AI returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Workers AI returned an empty response")]
    Empty,
}
