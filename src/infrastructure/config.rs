use crate::application::ingestion::IngestionSettings;
use crate::domain::anomaly::{
    AnomalyPolicy, CHANGE_HOLD_MS, CHANGE_THRESHOLD, RISE_HOLD_MS, RISE_THRESHOLD,
    UNUSUAL_TIME_WINDOW_MS,
};
use crate::domain::rolling_window::DEFAULT_MAX_DATA_POINTS;
use crate::domain::sensor::RecordShape;
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

const CONFIG_FILE: &str = "config/dashboard";
const ENV_PREFIX: &str = "DASHBOARD";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerSettings,
    pub serial: SerialSettings,
    pub ingestion: IngestionConfig,
    pub anomaly: AnomalyConfig,
    pub assistant: AssistantSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialSettings {
    /// Empty selects the first port the host lists.
    pub port: String,
    pub baud_rate: u32,
    pub presence_poll_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            presence_poll_ms: 1000,
        }
    }
}

impl SerialSettings {
    pub fn port(&self) -> Option<&str> {
        let port = self.port.trim();
        (!port.is_empty()).then_some(port)
    }

    pub fn presence_poll_interval(&self) -> Duration {
        Duration::from_millis(self.presence_poll_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    pub shape: RecordShape,
    pub max_data_points: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            shape: RecordShape::MultiChannel,
            max_data_points: DEFAULT_MAX_DATA_POINTS,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    FirstDifference,
    WindowedRise,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnomalyConfig {
    pub policy: PolicyKind,
    pub change_threshold: f64,
    pub change_hold_ms: i64,
    pub rise_threshold: f64,
    pub rise_window_ms: i64,
    pub rise_hold_ms: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::FirstDifference,
            change_threshold: CHANGE_THRESHOLD,
            change_hold_ms: CHANGE_HOLD_MS,
            rise_threshold: RISE_THRESHOLD,
            rise_window_ms: UNUSUAL_TIME_WINDOW_MS,
            rise_hold_ms: RISE_HOLD_MS,
        }
    }
}

impl AnomalyConfig {
    pub fn policy(&self) -> AnomalyPolicy {
        match self.policy {
            PolicyKind::FirstDifference => AnomalyPolicy::FirstDifference {
                threshold: self.change_threshold,
                hold_ms: self.change_hold_ms,
            },
            PolicyKind::WindowedRise => AnomalyPolicy::WindowedRise {
                threshold: self.rise_threshold,
                window_ms: self.rise_window_ms,
                hold_ms: self.rise_hold_ms,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssistantSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: String::new(),
            timeout_ms: 30_000,
        }
    }
}

impl DashboardConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("invalid server.bind address {:?}", self.server.bind))
    }

    pub fn ingestion_settings(&self) -> IngestionSettings {
        IngestionSettings {
            shape: self.ingestion.shape,
            max_data_points: self.ingestion.max_data_points,
            policy: self.anomaly.policy(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;
        ensure!(self.serial.baud_rate > 0, "serial.baud_rate must be positive");
        ensure!(
            self.serial.presence_poll_ms > 0,
            "serial.presence_poll_ms must be positive"
        );
        ensure!(
            self.ingestion.max_data_points >= 1,
            "ingestion.max_data_points must be at least 1"
        );

        let anomaly = &self.anomaly;
        for (name, threshold) in [
            ("change_threshold", anomaly.change_threshold),
            ("rise_threshold", anomaly.rise_threshold),
        ] {
            ensure!(
                threshold.is_finite() && threshold >= 0.0,
                "anomaly.{} must be a non-negative number",
                name
            );
        }
        for (name, millis) in [
            ("change_hold_ms", anomaly.change_hold_ms),
            ("rise_window_ms", anomaly.rise_window_ms),
            ("rise_hold_ms", anomaly.rise_hold_ms),
        ] {
            ensure!(millis > 0, "anomaly.{} must be positive", name);
        }

        Ok(())
    }
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    finish(settings)
}

fn finish(settings: config::Config) -> anyhow::Result<DashboardConfig> {
    let dashboard: DashboardConfig = settings.try_deserialize()?;
    dashboard.validate()?;
    Ok(dashboard)
}
