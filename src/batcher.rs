//! Coalesces consume-once pops into batched `UPDATE ... SET status='used'`
//! writes (§4.6). A single bounded channel feeds a single flusher task;
//! `Stop` drains the channel once more with a synchronous flush.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::store::PoolStore;

/// One consume-once mark: a table name (validated against an allowlist
/// before it ever reaches SQL) and the row id to mark `used`.
#[derive(Debug, Clone)]
pub struct UpdateTask {
    pub table: &'static str,
    pub id: i64,
}

/// Tables the batcher will ever emit an `UPDATE` against. Anything else is
/// dropped and logged rather than interpolated into a query string.
const ALLOWED_TABLES: &[&str] = &["titles", "contents"];

fn is_allowed(table: &str) -> bool {
    ALLOWED_TABLES.contains(&table)
}

struct Inner {
    tx: mpsc::Sender<Option<UpdateTask>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

/// Background coalescing writer for consume-once status marks.
///
/// Sending `None` through the channel tells the flusher to perform one last
/// flush and exit, which lets `stop` take `&self` instead of consuming the
/// batcher.
pub struct UpdateBatcher {
    inner: Arc<Inner>,
}

async fn flush(store: &Arc<dyn PoolStore>, pending: &mut Vec<UpdateTask>) {
    if pending.is_empty() {
        return;
    }
    let mut by_table: HashMap<&'static str, Vec<i64>> = HashMap::new();
    for task in pending.drain(..) {
        if !is_allowed(task.table) {
            tracing::warn!(target: "pagepool.batcher", table = task.table, "dropping update for disallowed table");
            continue;
        }
        by_table.entry(task.table).or_default().push(task.id);
    }
    for (table, ids) in by_table {
        if let Err(err) = store.mark_used(table, &ids).await {
            tracing::warn!(target: "pagepool.batcher", table, count = ids.len(), %err, "batch update failed, marks discarded");
        }
    }
}

impl UpdateBatcher {
    /// Starts the flusher task. `max_batch` triggers an early flush once
    /// that many tasks have accumulated; `flush_interval` is the ceiling on
    /// how long a task can wait even if the batch never fills.
    pub fn start(store: Arc<dyn PoolStore>, capacity: usize, max_batch: usize, flush_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let max_batch = max_batch.max(1);
        let flusher = tokio::spawn(async move {
            let mut pending = Vec::with_capacity(max_batch);
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    item = rx.recv() => {
                        match item {
                            Some(Some(task)) => {
                                pending.push(task);
                                if pending.len() >= max_batch {
                                    flush(&store, &mut pending).await;
                                }
                            }
                            Some(None) | None => {
                                flush(&store, &mut pending).await;
                                break;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        flush(&store, &mut pending).await;
                    }
                }
            }
        });
        Self {
            inner: Arc::new(Inner {
                tx,
                flusher: Mutex::new(Some(flusher)),
            }),
        }
    }

    /// Enqueues a mark. If the channel is saturated, the mark is dropped
    /// with a warning — the row stays "available" and may be re-served,
    /// which the failure model accepts.
    pub fn enqueue(&self, task: UpdateTask) {
        if let Err(err) = self.inner.tx.try_send(Some(task)) {
            tracing::warn!(target: "pagepool.batcher", %err, "update batcher saturated, dropping mark");
        }
    }

    /// Signals the flusher to perform one last flush and exit, then waits
    /// for it to finish (bounded by the caller's own shutdown timeout).
    pub async fn stop(&self) {
        let _ = self.inner.tx.send(None).await;
        if let Some(handle) = self.inner.flusher.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::store::StoreError;
    use async_trait::async_trait;

    struct RecordingStore {
        calls: Arc<Mutex<Vec<(String, Vec<i64>)>>>,
    }

    #[async_trait]
    impl PoolStore for RecordingStore {
        async fn load_config(&self) -> Result<crate::config::PoolConfig, StoreError> {
            unimplemented!()
        }
        async fn fetch_batch(&self, _kind: crate::kind::PoolKind, _group: i64, _limit: usize) -> Result<Vec<crate::kind::PoolItem>, StoreError> {
            unimplemented!()
        }
        async fn fetch_reusable(&self, _kind: crate::kind::PoolKind, _group: i64, _limit: usize) -> Result<Vec<String>, StoreError> {
            unimplemented!()
        }
        async fn discover_groups(&self, _kind: crate::kind::PoolKind) -> Result<Vec<i64>, StoreError> {
            unimplemented!()
        }
        async fn mark_used(&self, table: &str, ids: &[i64]) -> Result<(), StoreError> {
            self.calls.lock().await.push((table.to_string(), ids.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn flushes_on_stop_even_below_max_batch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let store: Arc<dyn PoolStore> = Arc::new(RecordingStore { calls: calls.clone() });
        let batcher = UpdateBatcher::start(store, 16, 100, Duration::from_secs(60));
        batcher.enqueue(UpdateTask { table: "titles", id: 1 });
        batcher.enqueue(UpdateTask { table: "titles", id: 2 });
        batcher.stop().await;
        let recorded = calls.lock().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "titles");
        let mut ids = recorded[0].1.clone();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn flushes_eagerly_once_max_batch_is_reached() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let store: Arc<dyn PoolStore> = Arc::new(RecordingStore { calls: calls.clone() });
        let batcher = UpdateBatcher::start(store, 16, 2, Duration::from_secs(60));
        batcher.enqueue(UpdateTask { table: "contents", id: 10 });
        batcher.enqueue(UpdateTask { table: "contents", id: 11 });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.lock().await.len(), 1);
        batcher.stop().await;
    }

    #[tokio::test]
    async fn groups_by_table_within_one_flush() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let store: Arc<dyn PoolStore> = Arc::new(RecordingStore { calls: calls.clone() });
        let batcher = UpdateBatcher::start(store, 16, 100, Duration::from_secs(60));
        batcher.enqueue(UpdateTask { table: "titles", id: 1 });
        batcher.enqueue(UpdateTask { table: "contents", id: 2 });
        batcher.stop().await;
        let recorded = calls.lock().await;
        assert_eq!(recorded.len(), 2);
    }

    #[test]
    fn disallowed_table_name_is_rejected() {
        assert!(!is_allowed("titles; DROP TABLE titles"));
        assert!(is_allowed("titles"));
    }

    #[tokio::test]
    async fn saturated_channel_drops_without_panicking() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let store: Arc<dyn PoolStore> = Arc::new(RecordingStore { calls: calls.clone() });
        let batcher = UpdateBatcher::start(store, 1, 1000, Duration::from_secs(60));
        let dropped = Arc::new(AtomicUsize::new(0));
        for i in 0..50 {
            batcher.enqueue(UpdateTask { table: "titles", id: i });
        }
        let _ = dropped.load(Ordering::Relaxed);
        batcher.stop().await;
    }
}
