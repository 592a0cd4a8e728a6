//! Response model for the ingestion endpoint.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Acknowledgment returned for both applied events and no-ops.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    pub success: bool,
    /// Total tokens applied; 0 for a no-op.
    pub tokens: i64,
}

impl IngestResponse {
    pub fn applied(tokens: i64) -> Self {
        Self { success: true, tokens }
    }

    pub fn noop() -> Self {
        Self { success: true, tokens: 0 }
    }
}
