use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::config::LlmSettings;
use crate::error::LlmError;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Text-in, text-out completion. Owned by the caller and handed to the
/// assistant explicitly.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
    fn model_id(&self) -> &str;
}

/// Google Gemini `generateContent` over REST.
pub struct GeminiClient {
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, settings: &LlmSettings, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            model: settings.model.clone(),
            api_key: api_key.into(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// `None` when disabled or no key is configured.
    pub fn from_settings(settings: &LlmSettings, timeout: Duration) -> Result<Option<Self>, LlmError> {
        match settings.api_key.as_deref().filter(|_| settings.enabled) {
            Some(key) => Ok(Some(Self::new(key, settings, timeout)?)),
            None => Ok(None),
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            }
        })
    }
}

fn response_text(json: &serde_json::Value) -> Result<String, LlmError> {
    json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|t| !t.trim().is_empty())
        .ok_or(LlmError::Empty)
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/{}:generateContent", GEMINI_BASE, self.model);
        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await?;
        if status >= 400 {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown API error")
                .to_string();
            return Err(LlmError::Api { status, message });
        }
        debug!(
            model = %self.model,
            prompt_tokens = body["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            latency_ms = start.elapsed().as_millis() as u64,
            "Model responded"
        );
        response_text(&body)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_generation_config() {
        let c = GeminiClient::new("k", &LlmSettings::default(), Duration::from_secs(5)).unwrap();
        let body = c.request_body("hello");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1000);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(c.model_id(), "gemini-1.5-flash");
    }

    #[test]
    fn parts_are_concatenated() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Bone " }, { "text": "loss." }] } }]
        });
        assert_eq!(response_text(&json).unwrap(), "Bone loss.");
        assert!(matches!(response_text(&serde_json::json!({})), Err(LlmError::Empty)));
    }

    #[test]
    fn disabled_or_keyless_settings_yield_none() {
        let t = Duration::from_secs(5);
        assert!(GeminiClient::from_settings(&LlmSettings::default(), t).unwrap().is_none());
        let disabled = LlmSettings {
            enabled: false,
            api_key: Some("k".into()),
            ..LlmSettings::default()
        };
        assert!(GeminiClient::from_settings(&disabled, t).unwrap().is_none());
    }
}
