use crate::client::ModelClient;
use crate::models::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI 兼容的 chat/completions Provider
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    provider: String,
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl OpenAiCompatProvider {
    pub fn new(
        provider: String,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
        max_tokens: Option<usize>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        let timeout = timeout_secs.unwrap_or(120);
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()
            .context("Failed to build HTTP client for model provider")?;

        Ok(Self {
            provider,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
            max_tokens,
            temperature,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatProvider {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn call(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: Some(ResponseFormat::json_object()),
        };

        tracing::debug!(
            provider = %self.provider,
            model = %self.model,
            prompt_length = system_prompt.len() + user_prompt.len(),
            "Calling model API"
        );

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("Failed to send request to model API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                provider = %self.provider,
                status = %status,
                body = %body,
                "Model API request failed"
            );
            anyhow::bail!("Model API error {}: {}", status, body);
        }

        let chat_resp: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse model API response")?;

        tracing::debug!(
            usage = ?chat_resp.usage,
            finish_reason = ?chat_resp.choices.first().and_then(|c| c.finish_reason.as_deref()),
            "Model API response received"
        );

        extract_content(chat_resp)
    }
}

fn extract_content(resp: ChatResponse) -> Result<String> {
    resp.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("Empty response from model API"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> ChatResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn extracts_first_choice_content() {
        let resp = response(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"cards\":[]}"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }));
        assert_eq!(extract_content(resp).unwrap(), "{\"cards\":[]}");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let resp = response(serde_json::json!({"choices": []}));
        assert!(extract_content(resp).is_err());

        let blank = response(serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "  "}}]
        }));
        assert!(extract_content(blank).is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new(
            "openai".into(),
            "key".into(),
            None,
            Some("http://localhost:9000/v1/".into()),
            Some(5),
            None,
            None,
        )
        .unwrap();
        assert_eq!(provider.base_url, "http://localhost:9000/v1");
        assert_eq!(provider.model_name(), DEFAULT_MODEL);
    }
}
