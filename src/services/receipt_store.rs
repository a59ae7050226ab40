use crate::models::SignedReceipt;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Default receipt retention.
pub const DEFAULT_RECEIPT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct StoredReceipt {
    receipt: SignedReceipt,
    /// `None` when `now + ttl` overflows, i.e. never expires in practice.
    expires_at: Option<Instant>,
}

impl StoredReceipt {
    fn new(receipt: SignedReceipt, ttl: Duration) -> Self {
        Self {
            receipt,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory, time-bounded receipt store keyed by receipt id.
///
/// Expired entries are never returned. They are removed lazily on lookup
/// and in bulk by [`ReceiptStore::purge_expired`], which the janitor task
/// runs periodically.
pub struct ReceiptStore {
    entries: DashMap<String, StoredReceipt>,
    default_ttl: Duration,
}

impl ReceiptStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Insert or overwrite the entry for this receipt id.
    pub fn store(&self, receipt: SignedReceipt, ttl: Duration) {
        let id = receipt.receipt.id.clone();
        self.entries.insert(id, StoredReceipt::new(receipt, ttl));
    }

    /// Insert only if no live entry exists under this id.
    /// Returns `false` when the id is already taken.
    pub fn try_store(&self, receipt: SignedReceipt, ttl: Duration) -> bool {
        let id = receipt.receipt.id.clone();
        match self.entries.entry(id) {
            Entry::Occupied(mut existing) => {
                if !existing.get().is_expired(Instant::now()) {
                    return false;
                }
                existing.insert(StoredReceipt::new(receipt, ttl));
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredReceipt::new(receipt, ttl));
                true
            }
        }
    }

    /// `None` both for ids never stored and for expired ones.
    pub fn get(&self, id: &str) -> Option<SignedReceipt> {
        let now = Instant::now();
        {
            let entry = self.entries.get(id)?;
            if !entry.is_expired(now) {
                return Some(entry.receipt.clone());
            }
        }
        self.entries.remove_if(id, |_, stored| stored.is_expired(now));
        None
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns number purged.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Spawn a background task purging expired receipts every `every`.
    pub fn spawn_janitor(self: &Arc<Self>, every: Duration) -> StoreJanitor {
        let store = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, remaining = store.len(), "Purged expired receipts");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            tracing::debug!("Receipt store janitor stopped");
        });

        StoreJanitor {
            shutdown: Some(shutdown_tx),
            handle,
        }
    }
}

impl Default for ReceiptStore {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIPT_TTL)
    }
}

/// Handle to the purge task started by [`ReceiptStore::spawn_janitor`].
pub struct StoreJanitor {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl StoreJanitor {
    pub async fn shutdown(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            tracing::warn!("Receipt store janitor exited abnormally: {}", e);
        }
    }
}
