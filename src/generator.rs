//! Channel-backed generator pool for pre-encoded titles and keyword-emoji
//! strings, parameterized per group (§4.4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::GeneratorConfig;

type ComposeFn = dyn Fn(i64) -> String + Send + Sync;

struct GroupChannel {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    consumed: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// A per-group buffered-channel generator. `Pop` drains the channel; when
/// empty it falls back to synchronous generation so the render path never
/// blocks.
pub struct Generator {
    name: &'static str,
    groups: DashMap<i64, Arc<GroupChannel>>,
    compose: Arc<ComposeFn>,
    config: Mutex<GeneratorConfig>,
    total_consumed: AtomicU64,
}

/// Fill level and throughput for one group's channel.
#[derive(Debug, Clone)]
pub struct GeneratorGroupStats {
    pub group: i64,
    pub size: usize,
    pub filled: usize,
    pub consumed: u64,
}

/// Aggregated statistics across every group a [`Generator`] knows about.
#[derive(Debug, Clone)]
pub struct GeneratorStats {
    pub name: &'static str,
    pub groups: Vec<GeneratorGroupStats>,
    pub total_consumed: u64,
    pub estimated_bytes: u64,
}

const ESTIMATED_ITEM_BYTES: u64 = 128;

impl Generator {
    /// Creates an empty generator with no groups started yet. `compose` is
    /// called with a group id and must return one fully composed string; it
    /// is the shared title/keyword-emoji composition function from
    /// [`crate::compose`].
    pub fn new(name: &'static str, config: GeneratorConfig, compose: impl Fn(i64) -> String + Send + Sync + 'static) -> Self {
        Self {
            name,
            groups: DashMap::new(),
            compose: Arc::new(compose),
            config: Mutex::new(config),
            total_consumed: AtomicU64::new(0),
        }
    }

    fn spawn_group(&self, group: i64) -> Arc<GroupChannel> {
        let config = *self.config.lock().unwrap();
        let (tx, rx) = mpsc::channel(config.size.max(1));
        let channel = Arc::new(GroupChannel {
            tx: tx.clone(),
            rx: Mutex::new(rx),
            consumed: AtomicU64::new(0),
            workers: Mutex::new(Vec::new()),
        });
        let mut workers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let tx = tx.clone();
            let compose = self.compose.clone();
            let interval = config.refill_interval();
            let threshold_frac = config.threshold_frac;
            let size = config.size.max(1);
            let name = self.name;
            let handle = tokio::spawn(async move {
                loop {
                    let filled = size - tx.capacity();
                    if (filled as f64) >= threshold_frac * (size as f64) {
                        tokio::time::sleep(interval).await;
                        continue;
                    }
                    let s = compose(group);
                    if tx.send(s).await.is_err() {
                        tracing::debug!(target: "pagepool.generator", generator = name, group, "channel closed, worker exiting");
                        break;
                    }
                }
            });
            workers.push(handle);
        }
        *channel.workers.lock().unwrap() = workers;
        channel
    }

    /// Ensures a channel and worker set exist for every group in `group_ids`.
    pub fn start(&self, group_ids: &[i64]) {
        for &group in group_ids {
            self.groups.entry(group).or_insert_with(|| self.spawn_group(group));
        }
    }

    /// Non-blocking pop: returns a buffered string if one is ready,
    /// otherwise generates one synchronously on the caller's task. Never
    /// blocks the render path.
    pub fn pop(&self, group: i64) -> String {
        if let Some(channel) = self.groups.get(&group) {
            if let Ok(s) = channel.rx.lock().unwrap().try_recv() {
                channel.consumed.fetch_add(1, Ordering::Relaxed);
                self.total_consumed.fetch_add(1, Ordering::Relaxed);
                return s;
            }
        }
        self.total_consumed.fetch_add(1, Ordering::Relaxed);
        (self.compose)(group)
    }

    /// Aborts every worker task across every group.
    pub fn stop(&self) {
        for entry in self.groups.iter() {
            for handle in entry.value().workers.lock().unwrap().iter() {
                handle.abort();
            }
        }
    }

    /// Stops all workers, applies `new_config`, and restarts workers for the
    /// groups previously known.
    pub fn reload(&self, new_config: GeneratorConfig) {
        let group_ids: Vec<i64> = self.groups.iter().map(|e| *e.key()).collect();
        self.stop();
        self.groups.clear();
        *self.config.lock().unwrap() = new_config;
        self.start(&group_ids);
    }

    /// Drains every group's channel so its workers refill with current data.
    pub fn force_reload(&self) {
        for entry in self.groups.iter() {
            let mut rx = entry.value().rx.lock().unwrap();
            while rx.try_recv().is_ok() {}
        }
    }

    /// Drains one group's channel, triggering its workers to refill with
    /// whatever upstream data just changed.
    pub fn reload_group(&self, group: i64) {
        if let Some(channel) = self.groups.get(&group) {
            let mut rx = channel.rx.lock().unwrap();
            while rx.try_recv().is_ok() {}
        }
    }

    /// Adds channels for new groups and tears down channels for groups no
    /// longer present in `group_ids`.
    pub fn sync_groups(&self, group_ids: &[i64]) {
        let wanted: std::collections::HashSet<i64> = group_ids.iter().copied().collect();
        let stale: Vec<i64> = self
            .groups
            .iter()
            .map(|e| *e.key())
            .filter(|g| !wanted.contains(g))
            .collect();
        for group in stale {
            if let Some((_, channel)) = self.groups.remove(&group) {
                for handle in channel.workers.lock().unwrap().iter() {
                    handle.abort();
                }
            }
        }
        self.start(group_ids);
    }

    /// Aggregated fill levels, consumed totals and a rough memory estimate
    /// across every known group.
    pub fn stats(&self) -> GeneratorStats {
        let config = *self.config.lock().unwrap();
        let groups: Vec<GeneratorGroupStats> = self
            .groups
            .iter()
            .map(|entry| {
                let group = *entry.key();
                let filled = config.size.max(1) - entry.value().tx.capacity();
                GeneratorGroupStats {
                    group,
                    size: config.size,
                    filled,
                    consumed: entry.value().consumed.load(Ordering::Relaxed),
                }
            })
            .collect();
        let total_filled: u64 = groups.iter().map(|g| g.filled as u64).sum();
        GeneratorStats {
            name: self.name,
            total_consumed: self.total_consumed.load(Ordering::Relaxed),
            estimated_bytes: total_filled * ESTIMATED_ITEM_BYTES,
            groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn echo_config(size: usize, workers: usize) -> GeneratorConfig {
        GeneratorConfig {
            size,
            workers,
            threshold_frac: 0.8,
            refill_ms: 5,
        }
    }

    #[tokio::test]
    async fn pop_falls_back_to_synchronous_generation_with_zero_workers() {
        let gen = Generator::new("title_gen", echo_config(2, 0), |group| format!("title-for-{group}"));
        gen.start(&[1]);
        let s = gen.pop(1);
        assert_eq!(s, "title-for-1");
    }

    #[tokio::test]
    async fn pop_drains_buffered_values_when_workers_are_running() {
        let gen = Generator::new("title_gen", echo_config(4, 2), |group| format!("title-for-{group}"));
        gen.start(&[1]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let s = gen.pop(1);
        assert_eq!(s, "title-for-1");
        assert!(gen.stats().total_consumed >= 1);
    }

    #[tokio::test]
    async fn sync_groups_adds_and_removes() {
        let gen = Generator::new("kw_gen", echo_config(4, 1), |group| format!("kw-{group}"));
        gen.start(&[1, 2]);
        gen.sync_groups(&[2, 3]);
        let groups: Vec<i64> = gen.stats().groups.into_iter().map(|g| g.group).collect();
        assert!(groups.contains(&2));
        assert!(groups.contains(&3));
        assert!(!groups.contains(&1));
    }

    #[tokio::test]
    async fn stop_aborts_workers_without_panicking() {
        let gen = Generator::new("title_gen", echo_config(4, 2), |group| format!("title-for-{group}"));
        gen.start(&[1]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        gen.stop();
        let s = gen.pop(1);
        assert!(s.starts_with("title-for-"));
    }
}
