use crate::services::{Analytics, CacheKeyDeriver, CacheService, ReceiptIssuer, Summarizer};
use std::sync::Arc;
use std::time::Duration;

/// Per-request limits applied by the summarize handler.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_text_length: usize,
    pub ai_timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_text_length: 20_000,
            ai_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub summarizer: Arc<dyn Summarizer>,
    pub cache: Arc<CacheService>,
    pub cache_keys: CacheKeyDeriver,
    pub issuer: Arc<ReceiptIssuer>,
    pub analytics: Arc<Analytics>,
    pub limits: RequestLimits,
}
