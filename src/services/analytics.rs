use crate::{models::Stats, services::CacheService};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub struct Analytics {
    cache: Arc<CacheService>,
    paid_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    receipts_issued: AtomicU64,
    upstream_failures: AtomicU64,
    start_time: Instant,
}

impl Analytics {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self {
            cache,
            paid_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            receipts_issued: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn requests_key() -> String {
        format!("analytics:requests:{}", Utc::now().format("%Y-%m-%d"))
    }

    pub async fn record_paid_request(&self, endpoint: &str, payer: &str) {
        self.paid_requests.fetch_add(1, Ordering::Relaxed);

        // Daily counter survives restarts when Redis is available
        if self.cache.redis_connected() {
            let today = self.cache.increment(&Self::requests_key(), 1).await;
            tracing::debug!(requests_today = today, "Daily request counter updated");
        }

        tracing::info!(endpoint, payer, "Paid request accepted");
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receipt_issued(&self) {
        self.receipts_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn get_stats(&self, receipts_stored: usize) -> Stats {
        let paid_requests = self.paid_requests.load(Ordering::Relaxed);
        let requests_today = if self.cache.redis_connected() {
            self.cache.increment(&Self::requests_key(), 0).await.max(0) as u64
        } else {
            paid_requests
        };

        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;
        let cache_hit_rate = if lookups == 0 {
            0.0
        } else {
            cache_hits as f64 / lookups as f64
        };

        Stats {
            paid_requests,
            requests_today,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            receipts_issued: self.receipts_issued.load(Ordering::Relaxed),
            receipts_stored,
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn hit_rate_from_counters() {
        let analytics = Analytics::new(Arc::new(CacheService::in_memory(Duration::from_secs(60))));
        analytics.record_paid_request("/api/ai/summarize", "0xabc").await;
        analytics.record_paid_request("/api/ai/summarize", "0xabc").await;
        analytics.record_cache_miss();
        analytics.record_cache_hit();
        analytics.record_receipt_issued();

        let stats = analytics.get_stats(1).await;
        assert_eq!(stats.paid_requests, 2);
        assert_eq!(stats.requests_today, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.cache_hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.receipts_issued, 1);
        assert_eq!(stats.receipts_stored, 1);
    }

    #[tokio::test]
    async fn empty_stats() {
        let analytics = Analytics::new(Arc::new(CacheService::in_memory(Duration::from_secs(60))));
        let stats = analytics.get_stats(0).await;
        assert_eq!(stats.cache_hit_rate, 0.0);
        assert_eq!(stats.paid_requests, 0);
    }
}
