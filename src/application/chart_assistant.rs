// Chart assistant trait - opaque AI request/response collaborator
use crate::domain::chart_style::ChartSuggestion;
use async_trait::async_trait;

#[async_trait]
pub trait ChartAssistant: Send + Sync {
    /// Suggest a title and a color scheme for a free-text data description
    async fn suggest_style(&self, data_description: &str) -> anyhow::Result<ChartSuggestion>;

    /// Suggest a title only
    async fn suggest_title(&self, data_description: &str) -> anyhow::Result<String>;
}
