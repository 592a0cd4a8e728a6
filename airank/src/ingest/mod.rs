//! Telemetry ingestion: OTLP envelope models and the metric extractor.

pub mod extractor;
pub mod otlp;

pub use extractor::{extract, UsageEvent};
pub use otlp::MetricsEnvelope;

/// Resource attribute carrying the principal's handle.
pub const HANDLE_ATTRIBUTE: &str = "twitter_handle";

/// Resource attribute carrying the presented API key.
pub const API_KEY_ATTRIBUTE: &str = "cr_api_key";
