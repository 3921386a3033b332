use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    BoundaryJudgment, JudgmentConfidence, Oracle, OracleError, SpanAdjustment, SpanVerdict,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completion client for any OpenAI-compatible endpoint. Each oracle
/// operation is a single prompt constrained to a JSON-only reply.
pub struct ChatOracle {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl ChatOracle {
    pub fn from_env(model: &str, timeout: Duration) -> Result<Self> {
        let base_url = std::env::var("DOCTREE_ORACLE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("DOCTREE_ORACLE_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build oracle http client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn request_completion(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, OracleError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        let mut builder = self
            .http_client
            .post(self.endpoint())
            .header("Content-Type", "application/json");

        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.json(&request).send().await.map_err(|error| {
            if error.is_timeout() {
                OracleError::Timeout
            } else {
                OracleError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| OracleError::Malformed(error.to_string()))?;

        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        Ok(content)
    }
}

#[async_trait]
impl Oracle for ChatOracle {
    async fn resolve_boundary(
        &self,
        title: &str,
        window_text: &str,
    ) -> Result<BoundaryJudgment, OracleError> {
        let user_prompt = format!(
            "The document excerpt below is split into units. Each unit begins with a tag \
             like <unit 12>.\n\
             Report the unit in which the section titled \"{title}\" begins.\n\n\
             {window_text}\n\n\
             Reply with JSON only, no other text:\n\
             {{\"unit_id\": <number>, \"confidence\": \"high\" or \"low\"}}"
        );

        let content = self
            .request_completion(
                "You locate section boundaries in document text.",
                &user_prompt,
            )
            .await?;
        let payload = extract_json_payload(&content)?;

        let unit_id = payload
            .get("unit_id")
            .and_then(|value| value.as_u64())
            .ok_or_else(|| OracleError::Malformed("missing unit_id".to_string()))?;
        let confidence = match payload.get("confidence").and_then(|value| value.as_str()) {
            Some("low") => JudgmentConfidence::Low,
            _ => JudgmentConfidence::High,
        };

        Ok(BoundaryJudgment {
            unit_id: unit_id as usize,
            confidence,
        })
    }

    async fn verify_span(&self, title: &str, span_text: &str) -> Result<SpanVerdict, OracleError> {
        let user_prompt = format!(
            "Below is a span of document text. Judge whether it begins with the section \
             titled \"{title}\" and contains that section's content without the primary \
             content of a different section.\n\n\
             {span_text}\n\n\
             Reply with JSON only, no other text:\n\
             {{\"ok\": true or false, \"adjustment\": \"earlier\", \"later\" or null}}\n\
             Use \"earlier\" when the section actually starts before this span, \"later\" \
             when it starts after the span's first unit."
        );

        let content = self
            .request_completion(
                "You verify section boundaries in document text.",
                &user_prompt,
            )
            .await?;
        let payload = extract_json_payload(&content)?;

        let ok = payload
            .get("ok")
            .and_then(|value| value.as_bool())
            .ok_or_else(|| OracleError::Malformed("missing ok".to_string()))?;
        let suggested_adjustment = match payload.get("adjustment").and_then(|value| value.as_str())
        {
            Some("earlier") => Some(SpanAdjustment::ShiftEarlier),
            Some("later") => Some(SpanAdjustment::ShiftLater),
            _ => None,
        };

        Ok(SpanVerdict {
            ok,
            suggested_adjustment,
        })
    }

    async fn summarize(&self, span_text: &str) -> Result<String, OracleError> {
        let user_prompt = format!(
            "Summarize the following document section in two or three sentences. \
             Reply with the summary text only.\n\n{span_text}"
        );

        let content = self
            .request_completion("You summarize document sections.", &user_prompt)
            .await?;

        Ok(content)
    }
}

/// Tolerates code fences and prose around the JSON object some models emit.
fn extract_json_payload(content: &str) -> Result<serde_json::Value, OracleError> {
    let trimmed = content.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(open), Some(close)) if open < close => &trimmed[open..=close],
        _ => trimmed,
    };

    serde_json::from_str(candidate)
        .map_err(|error| OracleError::Malformed(format!("invalid json reply: {}", error)))
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_payload_strips_fences_and_prose() {
        let content = "Sure!\n```json\n{\"unit_id\": 4, \"confidence\": \"low\"}\n```";
        let payload = extract_json_payload(content).expect("payload");

        assert_eq!(payload["unit_id"], 4);
        assert_eq!(payload["confidence"], "low");
    }

    #[test]
    fn extract_json_payload_rejects_non_json() {
        assert!(matches!(
            extract_json_payload("the section starts on page 4"),
            Err(OracleError::Malformed(_))
        ));
    }
}
