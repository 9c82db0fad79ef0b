// Infrastructure layer - External dependencies and adapters
pub mod broadcast_notifier;
pub mod config;
pub mod csv_export;
pub mod gemini_assistant;
pub mod serial_port;
