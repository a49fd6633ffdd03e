use serde::Serialize;

use crate::domain::Decision;
use crate::registry::RegistryStats;

/// Response to a check: the single resolved decision.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub decision: Decision,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    #[serde(flatten)]
    pub stats: RegistryStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }
}
