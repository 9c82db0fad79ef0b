// Application layer - Use cases and ports
pub mod chart_assistant;
pub mod chart_style_service;
pub mod clock;
pub mod device_link;
pub mod ingestion;
pub mod notifier;
pub mod serial_session;
