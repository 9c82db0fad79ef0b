// Chart styling models produced by the AI assistant
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "Live Sensor Data";
pub const DEFAULT_DESCRIPTION: &str = "Connect a serial device to start streaming data.";
pub const DEFAULT_COLOR: &str = "hsl(var(--primary))";
pub const SUGGESTED_DESCRIPTION: &str = "AI-generated style for the dataset.";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSuggestion {
    pub title_suggestion: String,
    /// Color names or hex codes, comma or line separated.
    pub color_scheme: String,
}

impl ChartSuggestion {
    pub fn colors(&self) -> Vec<String> {
        self.color_scheme
            .split([',', '\n'])
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartStyle {
    pub title: String,
    pub description: String,
    pub color: String,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            color: DEFAULT_COLOR.to_string(),
        }
    }
}

impl ChartStyle {
    pub fn from_suggestion(suggestion: &ChartSuggestion) -> Self {
        let color = suggestion
            .colors()
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());
        Self {
            title: suggestion.title_suggestion.clone(),
            description: SUGGESTED_DESCRIPTION.to_string(),
            color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_color_wins() {
        let suggestion = ChartSuggestion {
            title_suggestion: "Greenhouse CO2".to_string(),
            color_scheme: " #2E8B57 , #A0522D,\n#FFD700".to_string(),
        };
        assert_eq!(suggestion.colors(), vec!["#2E8B57", "#A0522D", "#FFD700"]);

        let style = ChartStyle::from_suggestion(&suggestion);
        assert_eq!(style.title, "Greenhouse CO2");
        assert_eq!(style.color, "#2E8B57");
        assert_eq!(style.description, SUGGESTED_DESCRIPTION);
    }

    #[test]
    fn test_empty_scheme_keeps_default_color() {
        let suggestion = ChartSuggestion {
            title_suggestion: "Temperature".to_string(),
            color_scheme: " , ".to_string(),
        };
        assert_eq!(ChartStyle::from_suggestion(&suggestion).color, DEFAULT_COLOR);
    }
}
