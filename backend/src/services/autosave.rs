//! Debounced persistence of fictitious price overrides
//!
//! Each key has at most one pending write. A new value for the same key
//! aborts the pending write and restarts the quiet period, so a burst of
//! edits produces a single write of the last value.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::jobs::upsert_fictitious_price;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Trailing debounce with cancel-on-supersede
pub struct Debouncer<K> {
    delay: Duration,
    generation: AtomicU64,
    pending: Arc<Mutex<HashMap<K, Pending>>>,
}

fn lock<K>(pending: &Mutex<HashMap<K, Pending>>) -> MutexGuard<'_, HashMap<K, Pending>> {
    // A panicking write cannot leave the map half-updated
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `write` after the quiet period unless superseded or cancelled
    pub fn schedule<F, Fut>(&self, key: K, write: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.remove(&key) {
            previous.handle.abort();
        }

        let slots = Arc::clone(&self.pending);
        let slot_key = key.clone();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let claimed = {
                let mut slots = lock(&slots);
                match slots.get(&slot_key) {
                    Some(entry) if entry.generation == generation => {
                        slots.remove(&slot_key);
                        true
                    }
                    _ => false,
                }
            };
            if claimed {
                write().await;
            }
        });

        pending.insert(key, Pending { generation, handle });
    }

    /// Drop the pending write for `key`; true if one was pending
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, entry) in lock(&self.pending).drain() {
            entry.handle.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, entry) in lock(&self.pending).drain() {
            entry.handle.abort();
        }
    }
}

/// Autosave for per-(job, item) fictitious price overrides
pub struct FictitiousPriceAutosave {
    db: PgPool,
    debouncer: Debouncer<(Uuid, Uuid)>,
}

impl FictitiousPriceAutosave {
    pub fn new(db: PgPool, delay: Duration) -> Self {
        Self {
            db,
            debouncer: Debouncer::new(delay),
        }
    }

    pub fn schedule(&self, job_id: Uuid, item_id: Uuid, price: Decimal) {
        let db = self.db.clone();
        self.debouncer.schedule((job_id, item_id), move || async move {
            match upsert_fictitious_price(&db, job_id, item_id, price).await {
                Ok(_) => tracing::debug!(job_id = %job_id, item_id = %item_id, price = %price, "fictitious price autosaved"),
                Err(e) => tracing::error!(job_id = %job_id, item_id = %item_id, "fictitious price autosave failed: {}", e),
            }
        });
    }

    pub fn cancel(&self, job_id: Uuid, item_id: Uuid) -> bool {
        self.debouncer.cancel(&(job_id, item_id))
    }

    pub fn pending_count(&self) -> usize {
        self.debouncer.pending_count()
    }

    pub fn shutdown(&self) {
        let pending = self.debouncer.pending_count();
        if pending > 0 {
            tracing::info!(pending, "discarding pending fictitious price writes");
        }
        self.debouncer.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, Arc<AtomicUsize>) {
        (Arc::new(Mutex::new(Vec::new())), Arc::new(AtomicUsize::new(0)))
    }

    fn schedule_value(
        debouncer: &Debouncer<&'static str>,
        key: &'static str,
        value: u32,
        written: &Arc<Mutex<Vec<u32>>>,
        count: &Arc<AtomicUsize>,
    ) {
        let written = Arc::clone(written);
        let count = Arc::clone(count);
        debouncer.schedule(key, move || async move {
            written.lock().unwrap().push(value);
            count.fetch_add(1, Ordering::SeqCst);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_last_value() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let (written, count) = recorder();

        for value in 1..=5 {
            schedule_value(&debouncer, "job/item", value, &written, &count);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*written.lock().unwrap(), vec![5]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let (written, count) = recorder();

        schedule_value(&debouncer, "a", 1, &written, &count);
        schedule_value(&debouncer, "b", 2, &written, &count);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        let mut values = written.lock().unwrap().clone();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_write() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let (written, count) = recorder();

        schedule_value(&debouncer, "a", 1, &written, &count);
        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_pending_writes() {
        let (written, count) = recorder();
        {
            let debouncer = Debouncer::new(Duration::from_millis(1000));
            schedule_value(&debouncer, "a", 1, &written, &count);
            schedule_value(&debouncer, "b", 2, &written, &count);
        }
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(written.lock().unwrap().is_empty());
    }
}
