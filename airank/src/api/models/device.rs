//! API models for the device-code login flow.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Issued to the CLI when it starts a login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceCodeGrant {
    pub device_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DevicePollQuery {
    pub code: String,
}

/// Poll result: pending until the browser side approves the code.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DevicePollResponse {
    Pending,
    Complete {
        api_key: Option<String>,
        twitter_handle: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceApproveRequest {
    pub code: String,
    pub twitter_handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceApproveResponse {
    pub success: bool,
}
