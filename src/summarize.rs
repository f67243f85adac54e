//! Summarization/description collaborator.
//!
//! Treated as unreliable and slow: callers request a completion for a named
//! prompt and fall back to extracted text on failure. The image loader is
//! the one caller that hard-requires this collaborator, since an image has
//! no text to fall back to.

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::SummarizerConfig;

/// Binary attachment passed alongside a prompt (image description).
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Text-completion capability: `complete(prompt_id, variables, attachment)`.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn complete(
        &self,
        prompt_id: &str,
        variables: &HashMap<String, String>,
        attachment: Option<&Attachment>,
    ) -> Result<String>;

    fn is_available(&self) -> bool;
}

/// Prompt templates keyed by id. `{name}` placeholders are substituted from
/// the variables map.
fn prompt_template(prompt_id: &str) -> Option<&'static str> {
    match prompt_id {
        "document-summary" => Some(
            "Summarize the following document in a short paragraph. \
             Keep concrete names and terms.\n\nTitle: {title}\n\n{content}",
        ),
        "image-description" => Some(
            "Describe this image in detail so it can be found by text \
             search. Mention any visible text, diagrams, and subjects. \
             File name: {name}",
        ),
        _ => None,
    }
}

fn render_prompt(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in variables {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

pub fn create_summarizer(config: &SummarizerConfig) -> Result<Box<dyn Summarizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSummarizer)),
        "openai" => Ok(Box::new(OpenAiSummarizer::new(config)?)),
        other => bail!("Unknown summarizer provider: {}", other),
    }
}

/// Always-unavailable summarizer. Summaries are skipped; image description
/// surfaces a configuration error at the caller.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn complete(
        &self,
        _prompt_id: &str,
        _variables: &HashMap<String, String>,
        _attachment: Option<&Attachment>,
    ) -> Result<String> {
        bail!("Summarizer provider is disabled")
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// OpenAI-compatible chat-completions backend. Requires `OPENAI_API_KEY`.
pub struct OpenAiSummarizer {
    model: String,
    url: String,
    timeout_secs: u64,
}

impl OpenAiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("summarizer.model required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn complete(
        &self,
        prompt_id: &str,
        variables: &HashMap<String, String>,
        attachment: Option<&Attachment>,
    ) -> Result<String> {
        let template = prompt_template(prompt_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown prompt id: {}", prompt_id))?;
        let prompt = render_prompt(template, variables);

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let content = match attachment {
            Some(att) => {
                let data_url = format!(
                    "data:{};base64,{}",
                    att.mime,
                    base64::engine::general_purpose::STANDARD.encode(&att.bytes)
                );
                serde_json::json!([
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ])
            }
            None => serde_json::json!(prompt),
        };

        let body = serde_json::json!({
            "model": self.model,
            "messages": [ { "role": "user", "content": content } ],
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let response = client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Summarizer API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid summarizer response"))?;

        Ok(text.trim().to_string())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitution() {
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), "Notes".to_string());
        vars.insert("content".to_string(), "body text".to_string());
        let rendered = render_prompt(prompt_template("document-summary").unwrap(), &vars);
        assert!(rendered.contains("Title: Notes"));
        assert!(rendered.contains("body text"));
        assert!(!rendered.contains("{title}"));
    }

    #[test]
    fn unknown_prompt_id_is_none() {
        assert!(prompt_template("nope").is_none());
    }

    #[tokio::test]
    async fn disabled_summarizer_errors() {
        let s = DisabledSummarizer;
        assert!(!s.is_available());
        let err = s
            .complete("document-summary", &HashMap::new(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
