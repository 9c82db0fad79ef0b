// Domain layer - sensor records and the pure stream-processing pieces
pub mod anomaly;
pub mod chart_style;
pub mod line_framer;
pub mod record_parser;
pub mod rolling_window;
pub mod sensor;
pub mod text_decoder;
