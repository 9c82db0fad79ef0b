// Gemini assistant - generative AI implementation of the chart assistant
use crate::application::chart_assistant::ChartAssistant;
use crate::domain::chart_style::ChartSuggestion;
use crate::infrastructure::config::AssistantSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GeminiAssistant {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitleOnly {
    suggested_title: String,
}

impl GeminiAssistant {
    pub fn new(settings: &AssistantSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn build_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint,
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.api_key)
        )
    }

    async fn generate<T: DeserializeOwned>(&self, prompt: String) -> Result<T> {
        if self.api_key.is_empty() {
            anyhow::bail!("No API key configured for the AI assistant");
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(prompt) }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.build_url())
            .json(&request)
            .send()
            .await
            .context("Failed to send request to the AI service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("AI request failed with status {}: {}", status, body);
        }

        let data = response
            .json::<GenerateContentResponse>()
            .await
            .context("Failed to parse AI response")?;

        parse_output(&data)
    }
}

fn style_prompt(data_description: &str) -> String {
    format!(
        "You suggest visually appealing, context-appropriate color schemes and titles for charts.\n\n\
         Data description: {}\n\n\
         Reply with a JSON object with two string fields:\n\
         - \"colorScheme\": a comma-separated list of color names or hex codes suited to the data\n\
         - \"titleSuggestion\": a concise, informative chart title",
        data_description
    )
}

fn title_prompt(data_description: &str) -> String {
    format!(
        "You suggest concise, informative chart titles from a description of the data.\n\n\
         Data description: {}\n\n\
         Reply with a JSON object with one string field, \"suggestedTitle\".",
        data_description
    )
}

/// Pull the first candidate's text and decode it as `T`.
fn parse_output<T: DeserializeOwned>(response: &GenerateContentResponse) -> Result<T> {
    let text: String = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .filter(|text: &String| !text.trim().is_empty())
        .context("AI response contained no output")?;

    serde_json::from_str(strip_code_fence(&text)).context("AI output did not match the expected schema")
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[async_trait]
impl ChartAssistant for GeminiAssistant {
    async fn suggest_style(&self, data_description: &str) -> Result<ChartSuggestion> {
        self.generate(style_prompt(data_description)).await
    }

    async fn suggest_title(&self, data_description: &str) -> Result<String> {
        let output: TitleOnly = self.generate(title_prompt(data_description)).await?;
        Ok(output.suggested_title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_parse_style_output() {
        let data = response(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "{\"colorScheme\": \"#1f77b4, #ff7f0e\", \"titleSuggestion\": \"CPU Temperature\"}" }]
                }
            }]
        }));

        let suggestion: ChartSuggestion = parse_output(&data).unwrap();
        assert_eq!(suggestion.title_suggestion, "CPU Temperature");
        assert_eq!(suggestion.colors(), vec!["#1f77b4", "#ff7f0e"]);
    }

    #[test]
    fn test_parse_fenced_title_output() {
        let data = response(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n{\"suggestedTitle\": \"Greenhouse Humidity\"}\n```" }] }
            }]
        }));

        let output: TitleOnly = parse_output(&data).unwrap();
        assert_eq!(output.suggested_title, "Greenhouse Humidity");
    }

    #[test]
    fn test_parse_rejects_empty_or_mismatched_output() {
        let empty = response(serde_json::json!({ "candidates": [] }));
        assert!(parse_output::<ChartSuggestion>(&empty).is_err());

        let wrong = response(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"title\": \"x\"}" }] } }]
        }));
        assert!(parse_output::<ChartSuggestion>(&wrong).is_err());
    }

    #[test]
    fn test_build_url_encodes_key() {
        let assistant = GeminiAssistant::new(&AssistantSettings {
            endpoint: "https://example.test/".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: "a b&c".to_string(),
            timeout_ms: 1000,
        })
        .unwrap();

        assert_eq!(
            assistant.build_url(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent?key=a%20b%26c"
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let assistant = GeminiAssistant::new(&AssistantSettings::default()).unwrap();
        let err = assistant.suggest_title("temperature readings").await.unwrap_err();
        assert!(err.to_string().contains("No API key"));
    }
}
