//! Fixed-capacity ring of pre-generated string artifacts with a background
//! producer (§4.1). `Get` never blocks the request path: if the ring is
//! empty it generates synchronously on the caller's task and signals the
//! producer to catch up.
//!
//! This implementation keeps a fixed external contract (bounded capacity,
//! non-blocking `get`, a 1-slot refill signal, a low-mark-triggered
//! background producer) while storing the ring behind a `std::sync::Mutex`
//! rather than hand-rolled atomics over a fixed slice — simpler, and safe.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

const YIELD_EVERY: u64 = 1000;

type GeneratorFn = dyn Fn() -> String + Send + Sync;

struct RingState {
    items: Mutex<VecDeque<String>>,
    capacity: AtomicUsize,
    low_mark: AtomicUsize,
    fill_fraction: f64,
    generator: Box<GeneratorFn>,
    running: AtomicBool,
    paused: AtomicBool,
    total_generated: AtomicU64,
    total_consumed: AtomicU64,
    refill_count: AtomicU64,
    refill_tx: mpsc::Sender<()>,
}

/// A ring pool for a single kind of generated-artifact string (`cls`, `url`
/// or `keyword_emoji`).
pub struct RingPool {
    name: String,
    state: Arc<RingState>,
}

/// Point-in-time statistics for a [`RingPool`].
#[derive(Debug, Clone)]
pub struct RingStats {
    pub name: String,
    pub capacity: usize,
    pub count: usize,
    pub fill_percent: f64,
    pub total_generated: u64,
    pub total_consumed: u64,
    pub refill_count: u64,
    pub running: bool,
    pub paused: bool,
}

impl RingPool {
    /// Creates a new ring with `capacity` slots and spawns its background
    /// producer task. `generator` is called to synthesize one string at a
    /// time; it must never panic across an await point (it is synchronous)
    /// but a panic inside it is caught so a single bad generation never
    /// takes the ring down.
    pub fn start(
        name: impl Into<String>,
        capacity: usize,
        fill_fraction: f64,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Arc<Self> {
        let (refill_tx, refill_rx) = mpsc::channel(1);
        let state = Arc::new(RingState {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: AtomicUsize::new(capacity),
            low_mark: AtomicUsize::new(Self::low_mark_of(capacity, fill_fraction)),
            fill_fraction,
            generator: Box::new(generator),
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            total_generated: AtomicU64::new(0),
            total_consumed: AtomicU64::new(0),
            refill_count: AtomicU64::new(0),
            refill_tx,
        });
        let pool = Arc::new(Self {
            name: name.into(),
            state: state.clone(),
        });
        tokio::spawn(Self::producer_loop(state, refill_rx, pool.name.clone()));
        let _ = pool.state.refill_tx.try_send(());
        pool
    }

    fn low_mark_of(capacity: usize, fill_fraction: f64) -> usize {
        ((capacity as f64) * fill_fraction).floor() as usize
    }

    fn generate_one(state: &RingState) -> String {
        let result = panic::catch_unwind(AssertUnwindSafe(|| (state.generator)()));
        state.total_generated.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(s) => s,
            Err(_) => {
                tracing::error!(target: "pagepool.ring", "ring generator panicked, substituting empty string");
                String::new()
            }
        }
    }

    async fn producer_loop(state: Arc<RingState>, mut refill_rx: mpsc::Receiver<()>, name: String) {
        while let Some(()) = refill_rx.recv().await {
            if !state.running.load(Ordering::Relaxed) {
                break;
            }
            Self::refill_once(&state, &name).await;
        }
    }

    async fn refill_once(state: &RingState, name: &str) {
        let mut generated_this_pass = 0u64;
        loop {
            if state.paused.load(Ordering::Relaxed) || !state.running.load(Ordering::Relaxed) {
                break;
            }
            let capacity = state.capacity.load(Ordering::Relaxed);
            let needs_more = {
                let items = state.items.lock().unwrap();
                items.len() < capacity
            };
            if !needs_more {
                break;
            }
            let s = Self::generate_one(state);
            {
                let mut items = state.items.lock().unwrap();
                if items.len() < state.capacity.load(Ordering::Relaxed) {
                    items.push_back(s);
                }
            }
            generated_this_pass += 1;
            if generated_this_pass % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }
        if generated_this_pass > 0 {
            state.refill_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "pagepool.ring", ring = name, generated_this_pass, "ring refilled");
        }
    }

    fn trigger_refill(&self) {
        let _ = self.state.refill_tx.try_send(());
    }

    /// Pops one string off the ring. If the ring is empty, generates one
    /// synchronously on the caller's task instead of blocking.
    pub fn get(&self) -> String {
        let popped = {
            let mut items = self.state.items.lock().unwrap();
            items.pop_front()
        };
        match popped {
            Some(s) => {
                self.state.total_consumed.fetch_add(1, Ordering::Relaxed);
                let count = self.state.items.lock().unwrap().len();
                if count < self.state.low_mark.load(Ordering::Relaxed) {
                    self.trigger_refill();
                }
                s
            }
            None => {
                self.trigger_refill();
                let s = Self::generate_one(&self.state);
                self.state.total_consumed.fetch_add(1, Ordering::Relaxed);
                s
            }
        }
    }

    /// Pauses the background producer. In-flight `get` calls still fall
    /// back to synchronous generation.
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::Relaxed);
    }

    /// Resumes the background producer and triggers an immediate refill.
    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::Relaxed);
        self.trigger_refill();
    }

    /// Synchronously fills the ring to at least `capacity * target_fraction`,
    /// for use before the first request is served.
    pub fn warmup(&self, target_fraction: f64) {
        let capacity = self.state.capacity.load(Ordering::Relaxed);
        let target = ((capacity as f64) * target_fraction).ceil() as usize;
        loop {
            let len = self.state.items.lock().unwrap().len();
            if len >= target || len >= capacity {
                break;
            }
            let s = Self::generate_one(&self.state);
            self.state.items.lock().unwrap().push_back(s);
        }
    }

    /// Resizes the ring to `new_capacity`, truncating live items if shrinking
    /// and triggering a refill if growing.
    pub fn resize(&self, new_capacity: usize) {
        {
            let mut items = self.state.items.lock().unwrap();
            if items.len() > new_capacity {
                items.truncate(new_capacity);
            }
        }
        self.state.capacity.store(new_capacity, Ordering::Relaxed);
        self.state
            .low_mark
            .store(Self::low_mark_of(new_capacity, self.state.fill_fraction), Ordering::Relaxed);
        self.trigger_refill();
    }

    /// Drops all items currently in the ring without generating new ones.
    pub fn clear(&self) {
        self.state.items.lock().unwrap().clear();
    }

    /// Stops the background producer permanently. Further `get` calls keep
    /// working via synchronous fallback generation.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::Relaxed);
    }

    /// Snapshot of counters, capacity, fill percent and flags.
    pub fn stats(&self) -> RingStats {
        let capacity = self.state.capacity.load(Ordering::Relaxed);
        let count = self.state.items.lock().unwrap().len();
        RingStats {
            name: self.name.clone(),
            capacity,
            count,
            fill_percent: if capacity == 0 { 0.0 } else { (count as f64 / capacity as f64) * 100.0 },
            total_generated: self.state.total_generated.load(Ordering::Relaxed),
            total_consumed: self.state.total_consumed.load(Ordering::Relaxed),
            refill_count: self.state.refill_count.load(Ordering::Relaxed),
            running: self.state.running.load(Ordering::Relaxed),
            paused: self.state.paused.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;
    use std::time::Duration;

    fn counting_generator() -> (impl Fn() -> String + Send + Sync + 'static, Arc<StdAtomicU64>) {
        let counter = Arc::new(StdAtomicU64::new(0));
        let counter_clone = counter.clone();
        (
            move || {
                let n = counter_clone.fetch_add(1, Ordering::Relaxed);
                format!("item-{n}")
            },
            counter,
        )
    }

    #[tokio::test]
    async fn warmup_fills_to_target_fraction() {
        let (gen, _) = counting_generator();
        let ring = RingPool::start("test", 100, 0.2, gen);
        ring.warmup(0.5);
        assert!(ring.stats().count >= 50);
    }

    #[tokio::test]
    async fn get_never_returns_empty_when_generator_is_infinite() {
        let (gen, _) = counting_generator();
        let ring = RingPool::start("test", 10, 0.2, gen);
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..50 {
            let s = ring.get();
            assert!(s.starts_with("item-"));
        }
    }

    #[tokio::test]
    async fn resize_shrinks_and_grows() {
        let (gen, _) = counting_generator();
        let ring = RingPool::start("test", 100, 0.2, gen);
        ring.warmup(1.0);
        ring.resize(10);
        assert!(ring.stats().count <= 10);
        ring.resize(50);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ring.stats().capacity, 50);
    }

    #[tokio::test]
    async fn clear_empties_the_ring() {
        let (gen, _) = counting_generator();
        let ring = RingPool::start("test", 20, 0.2, gen);
        ring.warmup(1.0);
        ring.clear();
        assert_eq!(ring.stats().count, 0);
    }

    #[tokio::test]
    async fn no_lost_increments_when_quiesced() {
        let (gen, _) = counting_generator();
        let ring = RingPool::start("test", 50, 0.2, gen);
        ring.warmup(1.0);
        ring.pause();
        for _ in 0..10 {
            ring.get();
        }
        let stats = ring.stats();
        let balance = stats.total_generated as i64 - stats.total_consumed as i64 - stats.count as i64;
        assert_eq!(balance, 0);
    }

    #[tokio::test]
    async fn survives_a_panicking_generator() {
        let ring = RingPool::start("test", 5, 0.2, || panic!("boom"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let s = ring.get();
        assert_eq!(s, "");
    }
}
