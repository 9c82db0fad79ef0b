// Application state for HTTP handlers
use crate::application::chart_style_service::ChartStyleService;
use crate::application::clock::Clock;
use crate::application::serial_session::SessionHandle;
use crate::infrastructure::broadcast_notifier::BroadcastNotifier;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub chart_styles: ChartStyleService,
    pub notifier: Arc<BroadcastNotifier>,
    pub clock: Arc<dyn Clock>,
    /// Cancelled when the server begins shutting down; ends event streams.
    pub shutdown: CancellationToken,
}
