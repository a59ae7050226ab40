use crate::models::SignedReceipt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SummarizeRequest {
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SummarizeResponse {
    pub result: String,
    pub model: String,
    pub cached: bool,
    /// `None` when the gateway runs without a signing key.
    pub receipt: Option<SignedReceipt>,
}

/// Value stored in the response cache under a derived cache key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedSummary {
    pub result: String,
    pub receipt_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_public_key: Option<String>,
    /// Signed by the key this gateway is running with.
    pub issued_by_this_gateway: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub signing_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_public_key: Option<String>,
    pub redis: bool,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Stats {
    pub paid_requests: u64,
    pub requests_today: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub receipts_issued: u64,
    pub receipts_stored: usize,
    pub upstream_failures: u64,
    pub uptime_seconds: u64,
}
