// HTTP request handlers
use crate::application::chart_style_service::ChartStyleError;
use crate::application::serial_session::{ConnectionState, SessionError};
use crate::domain::chart_style::ChartStyle;
use crate::domain::rolling_window::WindowSnapshot;
use crate::infrastructure::csv_export::{export_filename, render_csv, ExportError};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest outbound message accepted from clients, in bytes.
const MAX_MESSAGE_LEN: usize = 256;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        // 204 must not carry a body
        if self.status == StatusCode::NO_CONTENT {
            return StatusCode::NO_CONTENT.into_response();
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match e {
            SessionError::AlreadyConnected | SessionError::NotConnected => StatusCode::CONFLICT,
            SessionError::CapabilityUnavailable | SessionError::SessionClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SessionError::OpenFailure(_) | SessionError::WriteFailure(_) => StatusCode::BAD_GATEWAY,
            SessionError::SelectionCancelled => StatusCode::NO_CONTENT,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::Empty => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "No data to export. Connect a device and gather some data first.",
            ),
            other => {
                tracing::error!("CSV export failed: {}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<ChartStyleError> for ApiError {
    fn from(e: ChartStyleError) -> Self {
        let status = match e {
            ChartStyleError::Assistant => StatusCode::BAD_GATEWAY,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        ApiError::new(status, e.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: ConnectionState,
    pub connected: bool,
    pub port: Option<String>,
    pub anomaly: bool,
    pub points: usize,
}

#[derive(Deserialize)]
pub struct WriteRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct FanRequest {
    pub on: bool,
}

#[derive(Deserialize)]
pub struct DescriptionRequest {
    pub description: String,
}

#[derive(Serialize)]
pub struct TitleResponse {
    pub title: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let view = state.session.view();
    Json(StatusResponse {
        state: view.state,
        connected: view.is_connected(),
        port: view.port,
        anomaly: view.anomaly,
        points: view.readings.len(),
    })
}

/// Current window snapshot
pub async fn get_readings(State(state): State<Arc<AppState>>) -> Json<WindowSnapshot> {
    Json(state.session.view().readings)
}

/// Download the window as CSV
pub async fn export_readings(
    State(state): State<Arc<AppState>>,
) -> Result<Response<Body>, ApiError> {
    let snapshot = state.session.view().readings;
    let csv = render_csv(&snapshot)?;
    let filename = export_filename(state.clock.now_ms());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv;charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(csv))
        .map_err(|e| {
            tracing::error!("Response build error: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to build response")
        })
}

pub async fn connect(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    match state.session.connect().await {
        Ok(()) => Ok(StatusCode::OK),
        // the user backed out of device selection; nothing to report
        Err(SessionError::SelectionCancelled) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(e.into()),
    }
}

pub async fn disconnect(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.session.disconnect().await?;
    Ok(StatusCode::OK)
}

pub async fn write_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WriteRequest>,
) -> Result<StatusCode, ApiError> {
    check_message_length(&request.message)?;
    state.session.write(request.message).await?;
    Ok(StatusCode::OK)
}

fn check_message_length(message: &str) -> Result<(), ApiError> {
    if message.len() > MAX_MESSAGE_LEN {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("message exceeds {} bytes", MAX_MESSAGE_LEN),
        ));
    }
    Ok(())
}

pub async fn set_fan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FanRequest>,
) -> Result<StatusCode, ApiError> {
    state.session.set_fan(request.on).await?;
    Ok(StatusCode::OK)
}

pub async fn get_chart_style(State(state): State<Arc<AppState>>) -> Json<ChartStyle> {
    Json(state.chart_styles.current().await)
}

/// Ask the AI assistant for a new chart title and color
pub async fn enhance_chart(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DescriptionRequest>,
) -> Result<Json<ChartStyle>, ApiError> {
    let style = state.chart_styles.enhance_chart(&request.description).await?;
    Ok(Json(style))
}

pub async fn suggest_title(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DescriptionRequest>,
) -> Result<Json<TitleResponse>, ApiError> {
    let title = state.chart_styles.suggest_title(&request.description).await?;
    Ok(Json(TitleResponse { title }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (SessionError::NotConnected, StatusCode::CONFLICT),
            (SessionError::AlreadyConnected, StatusCode::CONFLICT),
            (SessionError::CapabilityUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (SessionError::OpenFailure("busy".into()), StatusCode::BAD_GATEWAY),
            (SessionError::WriteFailure("io".into()), StatusCode::BAD_GATEWAY),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }

        assert_eq!(
            ApiError::from(ExportError::Empty).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(ChartStyleError::DescriptionTooShort).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(ChartStyleError::Assistant).status,
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_no_content_error_has_empty_body() {
        let response = ApiError::from(SessionError::SelectionCancelled).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_message_length_is_capped() {
        assert!(check_message_length("1").is_ok());
        assert!(check_message_length(&"x".repeat(MAX_MESSAGE_LEN)).is_ok());

        let error = check_message_length(&"x".repeat(MAX_MESSAGE_LEN + 1)).unwrap_err();
        assert_eq!(error.status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
