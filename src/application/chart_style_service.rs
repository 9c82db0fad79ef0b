// Chart style service - Use case for AI-assisted chart styling
use crate::application::chart_assistant::ChartAssistant;
use crate::domain::chart_style::ChartStyle;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

const MIN_DESCRIPTION_LEN: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ChartStyleError {
    #[error("Data description cannot be empty.")]
    EmptyDescription,

    #[error("Please provide a more detailed description (at least 10 characters).")]
    DescriptionTooShort,

    #[error("Failed to get a suggestion from the AI. Please try again.")]
    Assistant,
}

#[derive(Clone)]
pub struct ChartStyleService {
    assistant: Arc<dyn ChartAssistant>,
    current: Arc<RwLock<ChartStyle>>,
}

impl ChartStyleService {
    pub fn new(assistant: Arc<dyn ChartAssistant>) -> Self {
        Self {
            assistant,
            current: Arc::new(RwLock::new(ChartStyle::default())),
        }
    }

    pub async fn current(&self) -> ChartStyle {
        self.current.read().await.clone()
    }

    /// Ask for a new title and color, and make it the current style.
    pub async fn enhance_chart(&self, data_description: &str) -> Result<ChartStyle, ChartStyleError> {
        let description = validate(data_description)?;

        let suggestion = self
            .assistant
            .suggest_style(description)
            .await
            .map_err(|e| {
                tracing::error!("AI enhancement failed: {:#}", e);
                ChartStyleError::Assistant
            })?;

        let style = ChartStyle::from_suggestion(&suggestion);
        *self.current.write().await = style.clone();
        Ok(style)
    }

    pub async fn suggest_title(&self, data_description: &str) -> Result<String, ChartStyleError> {
        let description = validate(data_description)?;

        self.assistant
            .suggest_title(description)
            .await
            .map_err(|e| {
                tracing::error!("AI title suggestion failed: {:#}", e);
                ChartStyleError::Assistant
            })
    }
}

fn validate(data_description: &str) -> Result<&str, ChartStyleError> {
    let description = data_description.trim();
    if description.is_empty() {
        return Err(ChartStyleError::EmptyDescription);
    }
    if description.chars().count() < MIN_DESCRIPTION_LEN {
        return Err(ChartStyleError::DescriptionTooShort);
    }
    Ok(description)
}
