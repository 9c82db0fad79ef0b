// Presentation layer - HTTP surface for the browser dashboard
pub mod app_state;
pub mod events;
pub mod handlers;
