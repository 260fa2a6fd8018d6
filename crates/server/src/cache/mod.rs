//! Read-through cache for the catalog views.
//!
//! Entries hold serialized JSON snapshots of store query results and never
//! expire on their own; they live until an invalidation removes them.
//!
//! # Fencing
//!
//! Every delete advances a cache-wide epoch and leaves a tombstone stamped
//! with it. A reader takes an [`EpochTicket`] before it queries the store and
//! hands it back to [`CatalogCache::populate`]; the populate is dropped when
//! the key was invalidated after the ticket was issued. A slow read of
//! pre-write data therefore cannot resurrect a view that a write has already
//! invalidated.
//!
//! Outstanding tickets are tracked, so a tombstone can be dropped once no
//! reader holds a ticket older than it (see
//! [`CatalogCache::reclaim_tombstones`]). Without that, every deleted
//! product would leave a `product-{id}` tombstone behind for good.

mod invalidation;
mod key;
mod read_through;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

pub use invalidation::CatalogChange;
pub use key::CacheKey;
pub use read_through::CatalogReader;

/// Epoch observed by a reader before it started its store query.
///
/// The ticket stays registered with its cache until it is dropped or
/// consumed by [`CatalogCache::populate`].
#[derive(Debug)]
pub struct EpochTicket {
    epoch: u64,
    readers: Arc<Readers>,
}

impl Drop for EpochTicket {
    fn drop(&mut self) {
        self.readers.release(self.epoch);
    }
}

/// Count of outstanding tickets per epoch.
#[derive(Debug, Default)]
struct Readers(Mutex<BTreeMap<u64, usize>>);

impl Readers {
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, usize>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, epoch: u64) {
        let mut outstanding = self.lock();
        if let Some(count) = outstanding.get_mut(&epoch) {
            *count -= 1;
            if *count == 0 {
                outstanding.remove(&epoch);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    /// `None` marks a tombstone.
    payload: Option<Arc<str>>,
    /// Epoch of the last delete of this key.
    fenced_at: u64,
}

impl Slot {
    fn fence(existing: Option<&Self>) -> u64 {
        existing.map_or(0, |slot| slot.fenced_at)
    }
}

/// Process-wide store of serialized catalog views.
///
/// Cheap to clone; clones share the same entries.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    inner: Arc<CatalogCacheInner>,
}

#[derive(Debug)]
struct CatalogCacheInner {
    entries: Cache<String, Slot>,
    epoch: AtomicU64,
    readers: Arc<Readers>,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogCache {
    /// Create an empty cache.
    ///
    /// No capacity bound and no TTL: the key space is the three aggregate
    /// views plus one entry per product.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CatalogCacheInner {
                entries: Cache::builder().name("catalog").build(),
                epoch: AtomicU64::new(0),
                readers: Arc::default(),
            }),
        }
    }

    /// Take a ticket to pass to [`Self::populate`] once the store answers.
    #[must_use]
    pub fn ticket(&self) -> EpochTicket {
        let readers = &self.inner.readers;
        // Read under the lock so reclaiming never misses a ticket in flight.
        let mut outstanding = readers.lock();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        *outstanding.entry(epoch).or_default() += 1;
        drop(outstanding);

        EpochTicket {
            epoch,
            readers: Arc::clone(readers),
        }
    }

    /// Whether a live entry exists for `key`.
    pub async fn has(&self, key: &CacheKey) -> bool {
        self.get(key).await.is_some()
    }

    /// The cached payload, or `None` on a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<str>> {
        self.inner
            .entries
            .get(&key.as_key())
            .await
            .and_then(|slot| slot.payload)
    }

    /// Store `payload` unconditionally.
    pub async fn set(&self, key: &CacheKey, payload: impl Into<Arc<str>>) {
        let payload = payload.into();
        self.inner
            .entries
            .entry(key.as_key())
            .and_compute_with(|existing| {
                let fenced_at = Slot::fence(existing.as_ref().map(moka::Entry::value));
                std::future::ready(Op::Put(Slot {
                    payload: Some(payload),
                    fenced_at,
                }))
            })
            .await;
    }

    /// Store a payload read from the store under `ticket`.
    ///
    /// Returns `false`, leaving the entry untouched, when `key` was deleted
    /// after `ticket` was taken.
    pub async fn populate(
        &self,
        key: &CacheKey,
        payload: impl Into<Arc<str>>,
        ticket: EpochTicket,
    ) -> bool {
        let payload = payload.into();
        let issued = ticket.epoch;
        let result = self
            .inner
            .entries
            .entry(key.as_key())
            .and_compute_with(|existing| {
                let fenced_at = Slot::fence(existing.as_ref().map(moka::Entry::value));
                let op = if fenced_at > issued {
                    Op::Nop
                } else {
                    Op::Put(Slot {
                        payload: Some(payload),
                        fenced_at,
                    })
                };
                std::future::ready(op)
            })
            .await;

        let stored = matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_));
        if !stored {
            tracing::debug!(key = %key, "Dropped populate fenced by a newer invalidation");
        }
        stored
    }

    /// Remove `key`. Deleting an absent key is a no-op.
    pub async fn delete(&self, key: &CacheKey) {
        self.delete_many(std::slice::from_ref(key)).await;
    }

    /// Remove every key in `keys` under one new epoch.
    pub async fn delete_many(&self, keys: &[CacheKey]) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        for key in keys {
            self.inner
                .entries
                .entry(key.as_key())
                .and_compute_with(|existing| {
                    let fenced_at =
                        Slot::fence(existing.as_ref().map(moka::Entry::value)).max(epoch);
                    std::future::ready(Op::Put(Slot {
                        payload: None,
                        fenced_at,
                    }))
                })
                .await;
        }
    }

    /// Drop tombstones that can no longer fence any reader.
    ///
    /// A tombstone only matters to tickets older than it. Once every
    /// outstanding ticket (and the current epoch) is at least its epoch,
    /// removing it changes no populate outcome. Returns how many were
    /// removed.
    pub async fn reclaim_tombstones(&self) -> usize {
        let horizon = {
            let outstanding = self.inner.readers.lock();
            let epoch = self.inner.epoch.load(Ordering::SeqCst);
            outstanding.keys().next().map_or(epoch, |&oldest| oldest.min(epoch))
        };

        let candidates: Vec<Arc<String>> = self
            .inner
            .entries
            .iter()
            .filter(|(_, slot)| slot.payload.is_none() && slot.fenced_at <= horizon)
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in candidates {
            let result = self
                .inner
                .entries
                .entry(key.as_ref().clone())
                .and_compute_with(|existing| {
                    let reclaimable = existing.as_ref().map(moka::Entry::value).is_some_and(
                        |slot| slot.payload.is_none() && slot.fenced_at <= horizon,
                    );
                    std::future::ready(if reclaimable { Op::Remove } else { Op::Nop })
                })
                .await;
            if matches!(result, CompResult::Removed(_)) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, horizon, "Reclaimed catalog tombstones");
        }
        removed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mobimarket_core::ProductId;

    use super::*;

    #[tokio::test]
    async fn test_miss_is_distinct_from_empty_payload() {
        let cache = CatalogCache::new();
        assert_eq!(cache.get(&CacheKey::Categories).await, None);

        cache.set(&CacheKey::Categories, "[]").await;
        assert_eq!(cache.get(&CacheKey::Categories).await.as_deref(), Some("[]"));
        assert!(cache.has(&CacheKey::Categories).await);
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_noop() {
        let cache = CatalogCache::new();
        cache.delete(&CacheKey::ProductDetail(ProductId::new(7))).await;
        cache.delete(&CacheKey::ProductDetail(ProductId::new(7))).await;
        assert!(!cache.has(&CacheKey::ProductDetail(ProductId::new(7))).await);
    }

    #[tokio::test]
    async fn test_delete_only_touches_named_keys() {
        let cache = CatalogCache::new();
        cache.set(&CacheKey::Latest, "[1]").await;
        cache.set(&CacheKey::Categories, "[\"phones\"]").await;

        cache.delete_many(&[CacheKey::Latest]).await;
        assert!(!cache.has(&CacheKey::Latest).await);
        assert!(cache.has(&CacheKey::Categories).await);
    }

    #[tokio::test]
    async fn test_populate_after_delete_is_fenced() {
        let cache = CatalogCache::new();
        let stale_read = cache.ticket();

        // A write lands and invalidates while the read is still querying.
        cache.delete(&CacheKey::Latest).await;

        assert!(!cache.populate(&CacheKey::Latest, "[\"old\"]", stale_read).await);
        assert!(!cache.has(&CacheKey::Latest).await);

        let fresh_read = cache.ticket();
        assert!(cache.populate(&CacheKey::Latest, "[\"new\"]", fresh_read).await);
        assert_eq!(cache.get(&CacheKey::Latest).await.as_deref(), Some("[\"new\"]"));
    }

    #[tokio::test]
    async fn test_fence_survives_repopulation() {
        let cache = CatalogCache::new();
        let slow = cache.ticket();
        cache.delete(&CacheKey::AllAdmin).await;

        let fast = cache.ticket();
        assert!(cache.populate(&CacheKey::AllAdmin, "[\"fresh\"]", fast).await);

        // The slow reader finishes last; the fresh entry must win.
        assert!(!cache.populate(&CacheKey::AllAdmin, "[\"stale\"]", slow).await);
        assert_eq!(
            cache.get(&CacheKey::AllAdmin).await.as_deref(),
            Some("[\"fresh\"]")
        );
    }

    #[tokio::test]
    async fn test_fence_is_per_key() {
        let cache = CatalogCache::new();
        let ticket = cache.ticket();
        cache.delete(&CacheKey::ProductDetail(ProductId::new(1))).await;

        assert!(cache.populate(&CacheKey::Categories, "[]", ticket).await);
    }

    #[tokio::test]
    async fn test_tombstone_kept_while_older_ticket_outstanding() {
        let cache = CatalogCache::new();
        let key = CacheKey::ProductDetail(ProductId::new(7));
        let slow = cache.ticket();
        cache.delete(&key).await;

        assert_eq!(cache.reclaim_tombstones().await, 0);
        assert!(!cache.populate(&key, "{\"id\":7}", slow).await);
        assert!(!cache.has(&key).await);
    }

    #[tokio::test]
    async fn test_tombstones_reclaimed_once_readers_finish() {
        let cache = CatalogCache::new();
        let deleted = CacheKey::ProductDetail(ProductId::new(7));
        let slow = cache.ticket();
        cache.delete_many(&[deleted, CacheKey::Categories]).await;
        cache.set(&CacheKey::Latest, "[]").await;
        drop(slow);

        assert_eq!(cache.reclaim_tombstones().await, 2);
        assert_eq!(cache.inner.entries.iter().count(), 1);
        assert!(cache.has(&CacheKey::Latest).await);

        let fresh = cache.ticket();
        assert!(cache.populate(&deleted, "{\"id\":7}", fresh).await);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = CatalogCache::new();
        let other = cache.clone();
        other.set(&CacheKey::Latest, "[]").await;
        assert!(cache.has(&CacheKey::Latest).await);
    }
}
