//! The public facade of the core: owns every pool, the update batcher, and
//! the pub-sub reload listener, and dispatches the render-time API (§4.5).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::batcher::{UpdateBatcher, UpdateTask};
use crate::bus::{ReloadAction, ReloadBus, ReloadMessage};
use crate::compose;
use crate::config::PoolConfig;
use crate::emoji;
use crate::errors::{PoolError, StartError};
use crate::generator::{Generator, GeneratorStats};
use crate::kind::{PoolItem, PoolKind, FALLBACK_GROUP};
use crate::memory::MemoryPool;
use crate::reusable::ReusableStore;
use crate::ring::{RingPool, RingStats};
use crate::rng::{random_css_class, random_url_path};
use crate::store::PoolStore;

/// Internal batcher tuning. The distilled singleton `pool_config` row never
/// names these fields, so they are fixed constants rather than steered
/// through [`PoolConfig`]; see the batcher entry in `DESIGN.md`.
const BATCHER_CAPACITY: usize = 1024;
const BATCHER_MAX_BATCH: usize = 200;
const BATCHER_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period `stop` allows the batcher's last flush to finish within,
/// per §5 "bounded drain window (e.g., 2 seconds)".
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const ON_DEMAND_REFILL_LIMIT: usize = 64;

/// `init → starting → running → {reloading → running}* → stopping →
/// stopped`. All public operations other than `start` require `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Init,
    Starting,
    Running,
    Reloading,
    Stopping,
    Stopped,
}

/// Which set of components [`PoolManager::force_refresh`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    All,
    Keywords,
    Images,
    Titles,
    Contents,
    KeywordEmojis,
    Cls,
    Url,
}

/// `"consumable"` vs `"reusable"`, carried on every [`PoolStatEntry`] so a
/// dashboard can render the two families differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolFamily {
    Consumable,
    Reusable,
}

/// One row of [`PoolManager::data_pool_stats`].
#[derive(Debug, Clone)]
pub struct PoolStatEntry {
    pub kind: &'static str,
    pub family: PoolFamily,
    pub group: Option<i64>,
    pub count: usize,
    pub capacity: usize,
}

/// Top-level snapshot returned by [`PoolManager::stats`].
#[derive(Debug, Clone)]
pub struct ManagerStats {
    pub state: ManagerState,
    pub groups: Vec<i64>,
    pub errors_total: u64,
    pub last_error_ago: Option<Duration>,
    pub cls: RingStats,
    pub url: RingStats,
    pub title_gen: GeneratorStats,
    pub keyword_emoji_gen: GeneratorStats,
}

struct ErrorCounter {
    total: AtomicU64,
    last_at: StdMutex<Option<Instant>>,
}

impl ErrorCounter {
    fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            last_at: StdMutex::new(None),
        }
    }

    fn record(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.last_at.lock().unwrap() = Some(Instant::now());
    }
}

/// Owns every pool kind and the supporting background machinery for one
/// process. Render code holds a `&PoolManager` (typically via `Arc`) and
/// calls the convenience getters; everything else is orchestration.
pub struct PoolManager {
    store: Arc<dyn PoolStore>,
    bus: Arc<dyn ReloadBus>,
    config: StdRwLock<PoolConfig>,
    state: StdMutex<ManagerState>,
    groups: StdRwLock<Vec<i64>>,

    titles: DashMap<i64, Arc<MemoryPool>>,
    contents: DashMap<i64, Arc<MemoryPool>>,
    reusable: Arc<ReusableStore>,

    cls_ring: Mutex<Arc<RingPool>>,
    url_ring: Mutex<Arc<RingPool>>,
    keyword_emoji_ring: DashMap<i64, Arc<RingPool>>,

    title_gen: Generator,
    keyword_emoji_gen: Generator,

    batcher: Mutex<Option<UpdateBatcher>>,
    errors: ErrorCounter,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl PoolManager {
    async fn discover_all_groups(store: &Arc<dyn PoolStore>) -> Vec<i64> {
        let mut found = HashSet::new();
        for kind in [PoolKind::Titles, PoolKind::Contents, PoolKind::Keywords, PoolKind::Images] {
            match store.discover_groups(kind).await {
                Ok(ids) => found.extend(ids),
                Err(err) => tracing::warn!(target: "pagepool.manager", ?kind, %err, "group discovery failed for this kind"),
            }
        }
        if found.is_empty() {
            tracing::warn!(target: "pagepool.manager", "group discovery returned nothing, falling back to [1]");
        }
        found.insert(FALLBACK_GROUP);
        found.into_iter().collect()
    }

    /// Loads configuration and group membership from `store`, builds every
    /// pool for the discovered groups, warms the reusable store, and spawns
    /// the refill/refresh/batcher/pub-sub background tasks.
    pub async fn start(store: Arc<dyn PoolStore>, bus: Arc<dyn ReloadBus>) -> Result<Arc<Self>, StartError> {
        let mut config = store.load_config().await.map_err(StartError::Store)?;
        config.clamp();
        let groups = Self::discover_all_groups(&store).await;

        let reusable = Arc::new(ReusableStore::new());
        for &group in &groups {
            match store.fetch_reusable(PoolKind::Keywords, group, config.keywords_size).await {
                Ok(rows) => reusable.load_keywords(group, rows),
                Err(err) => tracing::warn!(target: "pagepool.manager", group, %err, "initial keyword load failed"),
            }
            match store.fetch_reusable(PoolKind::Images, group, config.images_size).await {
                Ok(rows) => reusable.load_images(group, rows),
                Err(err) => tracing::warn!(target: "pagepool.manager", group, %err, "initial image load failed"),
            }
        }

        let titles = DashMap::new();
        let contents = DashMap::new();
        for &group in &groups {
            titles.insert(group, Arc::new(MemoryPool::new(config.titles_size)));
            contents.insert(group, Arc::new(MemoryPool::new(config.contents_size)));
        }

        let cls_ring = RingPool::start("cls", config.cls_pool_size, config.ring_fill_fraction, || {
            let mut rng = SmallRng::from_entropy();
            random_css_class(&mut rng)
        });
        let url_ring = RingPool::start("url", config.url_pool_size, config.ring_fill_fraction, || {
            let mut rng = SmallRng::from_entropy();
            random_url_path(&mut rng)
        });

        let keyword_emoji_ring = DashMap::new();
        for &group in &groups {
            let reusable_for_ring = reusable.clone();
            let ring = RingPool::start(
                format!("keyword_emoji[{group}]"),
                config.keyword_emoji_ring_size,
                config.ring_fill_fraction,
                move || {
                    let mut rng = SmallRng::from_entropy();
                    compose::compose_keyword_emoji(&reusable_for_ring, group, &mut rng)
                },
            );
            keyword_emoji_ring.insert(group, ring);
        }

        let reusable_for_title_gen = reusable.clone();
        let title_gen = Generator::new("title_gen", config.title_gen, move |group| {
            let mut rng = SmallRng::from_entropy();
            compose::compose_title(&reusable_for_title_gen, group, &mut rng)
        });
        title_gen.start(&groups);

        let reusable_for_kw_gen = reusable.clone();
        let keyword_emoji_gen = Generator::new("keyword_emoji_gen", config.keyword_emoji_gen, move |group| {
            let mut rng = SmallRng::from_entropy();
            compose::compose_keyword_emoji(&reusable_for_kw_gen, group, &mut rng)
        });
        keyword_emoji_gen.start(&groups);

        let batcher = UpdateBatcher::start(store.clone(), BATCHER_CAPACITY, BATCHER_MAX_BATCH, BATCHER_FLUSH_INTERVAL);

        let manager = Arc::new(Self {
            store,
            bus,
            config: StdRwLock::new(config),
            state: StdMutex::new(ManagerState::Starting),
            groups: StdRwLock::new(groups),
            titles,
            contents,
            reusable,
            cls_ring: Mutex::new(cls_ring),
            url_ring: Mutex::new(url_ring),
            keyword_emoji_ring,
            title_gen,
            keyword_emoji_gen,
            batcher: Mutex::new(Some(batcher)),
            errors: ErrorCounter::new(),
            tasks: StdMutex::new(Vec::new()),
        });

        manager.spawn_background_tasks();
        *manager.state.lock().unwrap() = ManagerState::Running;
        Ok(manager)
    }

    fn spawn_background_tasks(self: &Arc<Self>) {
        let refill_handle = {
            let manager = self.clone();
            tokio::spawn(async move { manager.refill_loop().await })
        };
        let refresh_handle = {
            let manager = self.clone();
            tokio::spawn(async move { manager.refresh_loop().await })
        };
        let listener_handle = {
            let manager = self.clone();
            tokio::spawn(async move { manager.reload_listener_loop().await })
        };
        *self.tasks.lock().unwrap() = vec![refill_handle, refresh_handle, listener_handle];
    }

    async fn refill_loop(self: Arc<Self>) {
        loop {
            let interval = self.config.read().unwrap().refill_interval();
            let threshold = self.config.read().unwrap().threshold;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            if *self.state.lock().unwrap() == ManagerState::Stopping {
                break;
            }
            let groups: Vec<i64> = self.groups.read().unwrap().clone();
            for &group in &groups {
                self.refill_consume_once(PoolKind::Titles, group, threshold).await;
                self.refill_consume_once(PoolKind::Contents, group, threshold).await;
            }
        }
    }

    async fn refill_consume_once(&self, kind: PoolKind, group: i64, threshold: usize) {
        let pool = match self.consume_once_pool(kind, group) {
            Some(p) => p,
            None => return,
        };
        if pool.len() >= threshold {
            return;
        }
        let limit = pool.capacity().saturating_sub(pool.len());
        match self.store.fetch_batch(kind, group, limit).await {
            Ok(rows) => {
                pool.push(rows);
            }
            Err(err) => {
                self.errors.record();
                tracing::warn!(target: "pagepool.manager", ?kind, group, %err, "refill query failed, retrying next tick");
            }
        }
    }

    async fn refresh_loop(self: Arc<Self>) {
        loop {
            let interval = self.config.read().unwrap().refresh_interval();
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            if *self.state.lock().unwrap() == ManagerState::Stopping {
                break;
            }
            self.refresh_all_reusable().await;
        }
    }

    async fn refresh_all_reusable(&self) {
        let (keywords_size, images_size) = {
            let cfg = self.config.read().unwrap();
            (cfg.keywords_size, cfg.images_size)
        };
        for group in self.reusable.keyword_groups() {
            match self.store.fetch_reusable(PoolKind::Keywords, group, keywords_size).await {
                Ok(rows) => self.reusable.load_keywords(group, rows),
                Err(err) => {
                    self.errors.record();
                    tracing::warn!(target: "pagepool.manager", group, %err, "keyword refresh failed");
                }
            }
        }
        for group in self.reusable.image_groups() {
            match self.store.fetch_reusable(PoolKind::Images, group, images_size).await {
                Ok(rows) => self.reusable.load_images(group, rows),
                Err(err) => {
                    self.errors.record();
                    tracing::warn!(target: "pagepool.manager", group, %err, "image refresh failed");
                }
            }
        }
    }

    async fn reload_listener_loop(self: Arc<Self>) {
        loop {
            if *self.state.lock().unwrap() == ManagerState::Stopping {
                break;
            }
            match self.bus.recv().await {
                Ok(message) => self.handle_reload_message(message).await,
                Err(err) => {
                    self.errors.record();
                    tracing::warn!(target: "pagepool.manager", %err, "reload bus receive failed, retrying");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }

    async fn handle_reload_message(&self, message: ReloadMessage) {
        match message.action {
            ReloadAction::Reload => {
                if let Err(err) = self.reload().await {
                    tracing::warn!(target: "pagepool.manager", %err, "reload triggered by pub-sub failed");
                }
            }
            ReloadAction::Refresh => self.refresh_all_reusable().await,
            ReloadAction::Resize => {
                let scope = message.scope.as_deref().unwrap_or("all");
                let parsed = match scope {
                    "keywords" => RefreshScope::Keywords,
                    "images" => RefreshScope::Images,
                    "titles" => RefreshScope::Titles,
                    "contents" => RefreshScope::Contents,
                    "keyword_emojis" | "keyword_emoji" => RefreshScope::KeywordEmojis,
                    "cls" => RefreshScope::Cls,
                    "url" => RefreshScope::Url,
                    _ => RefreshScope::All,
                };
                self.force_refresh(parsed).await;
            }
        }
    }

    fn consume_once_pool(&self, kind: PoolKind, group: i64) -> Option<Arc<MemoryPool>> {
        let map = match kind {
            PoolKind::Titles => &self.titles,
            PoolKind::Contents => &self.contents,
            _ => return None,
        };
        map.get(&group).map(|e| e.clone())
    }

    async fn pop_consume_once(&self, kind: PoolKind, group: i64) -> Result<PoolItem, PoolError> {
        let pool = self
            .consume_once_pool(kind, group)
            .or_else(|| self.consume_once_pool(kind, FALLBACK_GROUP));
        let pool = match pool {
            Some(p) => p,
            None => return Err(PoolError::Empty { kind, group }),
        };
        if let Some(item) = pool.pop() {
            return Ok(item);
        }
        let limit = pool.capacity().min(ON_DEMAND_REFILL_LIMIT);
        if let Ok(rows) = self.store.fetch_batch(kind, group, limit).await {
            pool.push(rows);
        }
        pool.pop().ok_or(PoolError::Empty { kind, group })
    }

    fn require_running(&self) -> Result<(), PoolError> {
        match *self.state.lock().unwrap() {
            ManagerState::Running | ManagerState::Reloading => Ok(()),
            _ => Err(PoolError::Stopped),
        }
    }

    fn require_valid_group(group: i64) -> Result<(), PoolError> {
        if group <= 0 {
            return Err(PoolError::InvalidGroup(group));
        }
        Ok(())
    }

    /// Kind-dispatching pop (§6 render-time API, generalized). Consume-once
    /// kinds enqueue an update-batcher mark on success before returning.
    pub async fn pop(&self, kind: PoolKind, group: i64) -> Result<String, PoolError> {
        self.require_running()?;
        Self::require_valid_group(group)?;
        match kind {
            PoolKind::Titles | PoolKind::Contents => {
                let item = self.pop_consume_once(kind, group).await?;
                if let Some(table) = kind.table_name() {
                    if let Some(batcher) = self.batcher.lock().await.as_ref() {
                        batcher.enqueue(UpdateTask { table, id: item.id });
                    }
                }
                Ok(item.text)
            }
            PoolKind::Keywords => {
                let mut rng = SmallRng::from_entropy();
                self.reusable
                    .get_random_keywords(group, 1, &mut rng)
                    .into_iter()
                    .next()
                    .ok_or(PoolError::Empty { kind, group })
            }
            PoolKind::Images => {
                let mut rng = SmallRng::from_entropy();
                self.reusable.get_random_image(group, &mut rng).ok_or(PoolError::Empty { kind, group })
            }
            PoolKind::Cls => Ok(self.cls_ring.lock().await.get()),
            PoolKind::Url => Ok(self.url_ring.lock().await.get()),
            PoolKind::KeywordEmoji => {
                let ring = self
                    .keyword_emoji_ring
                    .get(&group)
                    .or_else(|| self.keyword_emoji_ring.get(&FALLBACK_GROUP))
                    .map(|e| e.clone());
                match ring {
                    Some(ring) => Ok(ring.get()),
                    None => Err(PoolError::Empty { kind, group }),
                }
            }
            PoolKind::TitleGen => Ok(self.title_gen.pop(group)),
            PoolKind::KeywordEmojiGen => Ok(self.keyword_emoji_gen.pop(group)),
        }
    }

    /// `PopTitle(group)`.
    pub async fn pop_title(&self, group: i64) -> Result<String, PoolError> {
        self.pop(PoolKind::Titles, group).await
    }

    /// `PopContent(group)`.
    pub async fn pop_content(&self, group: i64) -> Result<String, PoolError> {
        self.pop(PoolKind::Contents, group).await
    }

    /// `RandomKeyword(group)`, pre-encoded.
    pub async fn random_keyword(&self, group: i64) -> Result<String, PoolError> {
        self.pop(PoolKind::Keywords, group).await
    }

    /// `RandomKeywords(group, n)`, pre-encoded.
    pub fn random_keywords(&self, group: i64, n: usize) -> Vec<String> {
        let mut rng = SmallRng::from_entropy();
        self.reusable.get_random_keywords(group, n, &mut rng)
    }

    /// `RandomRawKeyword(group)`.
    pub fn random_raw_keyword(&self, group: i64) -> Option<String> {
        let mut rng = SmallRng::from_entropy();
        self.reusable.get_raw_keywords(group, 1, &mut rng).into_iter().next()
    }

    /// `RandomImage(group)`.
    pub async fn random_image(&self, group: i64) -> Result<String, PoolError> {
        self.pop(PoolKind::Images, group).await
    }

    /// `Images(group)`.
    pub fn images(&self, group: i64) -> Vec<String> {
        self.reusable.get_images(group)
    }

    /// `RandomEmoji()`.
    pub fn random_emoji(&self) -> &'static str {
        let mut rng = SmallRng::from_entropy();
        emoji::random_emoji(&mut rng)
    }

    /// `RandomEmojiExclude(set)`.
    pub fn random_emoji_exclude(&self, exclude: &[&str]) -> &'static str {
        let mut rng = SmallRng::from_entropy();
        emoji::random_emoji_exclude(&mut rng, exclude)
    }

    /// `CacheCls()`.
    pub async fn cache_cls(&self) -> String {
        self.cls_ring.lock().await.get()
    }

    /// `CacheURL()`.
    pub async fn cache_url(&self) -> String {
        self.url_ring.lock().await.get()
    }

    /// `KeywordWithEmoji(group)`.
    pub async fn keyword_with_emoji(&self, group: i64) -> Result<String, PoolError> {
        self.pop(PoolKind::KeywordEmoji, group).await
    }

    /// Reloads configuration from the store and applies only the minimal
    /// operation per changed field — resize where possible, rebuild only
    /// where the change can't take effect in place.
    pub async fn reload(&self) -> Result<(), PoolError> {
        self.require_running()?;
        *self.state.lock().unwrap() = ManagerState::Reloading;
        let result = self.reload_inner().await;
        *self.state.lock().unwrap() = ManagerState::Running;
        result
    }

    async fn reload_inner(&self) -> Result<(), PoolError> {
        let mut new_config = match self.store.load_config().await {
            Ok(c) => c,
            Err(err) => {
                self.errors.record();
                tracing::warn!(target: "pagepool.manager", %err, "reload: store unreachable, keeping current config");
                return Ok(());
            }
        };
        new_config.clamp();
        let old_config = self.config.read().unwrap().clone();
        let diff = old_config.diff(&new_config);
        if diff.is_empty() {
            return Ok(());
        }

        if diff.titles_size {
            for entry in self.titles.iter() {
                entry.value().resize(new_config.titles_size);
            }
        }
        if diff.contents_size {
            for entry in self.contents.iter() {
                entry.value().resize(new_config.contents_size);
            }
        }
        if diff.cls_pool_size || diff.ring_fill_fraction {
            self.cls_ring.lock().await.resize(new_config.cls_pool_size);
        }
        if diff.url_pool_size || diff.ring_fill_fraction {
            self.url_ring.lock().await.resize(new_config.url_pool_size);
        }
        if diff.keyword_emoji_ring_size || diff.ring_fill_fraction {
            for entry in self.keyword_emoji_ring.iter() {
                entry.value().resize(new_config.keyword_emoji_ring_size);
            }
        }
        if diff.title_gen {
            self.title_gen.reload(new_config.title_gen);
        }
        if diff.keyword_emoji_gen {
            self.keyword_emoji_gen.reload(new_config.keyword_emoji_gen);
        }
        // keywords_size/images_size/threshold/refill_interval_ms/refresh_interval_ms
        // take effect on the next tick of their respective background loops,
        // which re-read `self.config` every iteration.

        *self.config.write().unwrap() = new_config;
        Ok(())
    }

    /// Immediate reload/clear + refill on the named scope, bypassing the
    /// normal tick schedule.
    pub async fn force_refresh(&self, scope: RefreshScope) {
        match scope {
            RefreshScope::All => {
                self.refresh_all_reusable().await;
                self.cls_ring.lock().await.clear();
                self.url_ring.lock().await.clear();
                for entry in self.keyword_emoji_ring.iter() {
                    entry.value().clear();
                }
                self.title_gen.force_reload();
                self.keyword_emoji_gen.force_reload();
            }
            RefreshScope::Keywords => {
                let size = self.config.read().unwrap().keywords_size;
                for group in self.reusable.keyword_groups() {
                    if let Ok(rows) = self.store.fetch_reusable(PoolKind::Keywords, group, size).await {
                        self.reusable.load_keywords(group, rows);
                    }
                }
            }
            RefreshScope::Images => {
                let size = self.config.read().unwrap().images_size;
                for group in self.reusable.image_groups() {
                    if let Ok(rows) = self.store.fetch_reusable(PoolKind::Images, group, size).await {
                        self.reusable.load_images(group, rows);
                    }
                }
            }
            RefreshScope::Titles => {
                for entry in self.titles.iter() {
                    entry.value().clear();
                }
                let groups: Vec<i64> = self.groups.read().unwrap().clone();
                for group in groups {
                    self.refill_consume_once(PoolKind::Titles, group, usize::MAX).await;
                }
            }
            RefreshScope::Contents => {
                for entry in self.contents.iter() {
                    entry.value().clear();
                }
                let groups: Vec<i64> = self.groups.read().unwrap().clone();
                for group in groups {
                    self.refill_consume_once(PoolKind::Contents, group, usize::MAX).await;
                }
            }
            RefreshScope::KeywordEmojis => {
                for entry in self.keyword_emoji_ring.iter() {
                    entry.value().clear();
                }
                self.keyword_emoji_gen.force_reload();
            }
            RefreshScope::Cls => self.cls_ring.lock().await.clear(),
            RefreshScope::Url => self.url_ring.lock().await.clear(),
        }
    }

    /// Reloads one group's keyword samples and nudges the keyword-emoji
    /// generator to regenerate with the fresh data.
    pub async fn reload_keyword_group(&self, group: i64) {
        let size = self.config.read().unwrap().keywords_size;
        match self.store.fetch_reusable(PoolKind::Keywords, group, size).await {
            Ok(rows) => {
                self.reusable.load_keywords(group, rows);
                self.keyword_emoji_gen.reload_group(group);
                self.title_gen.reload_group(group);
            }
            Err(err) => {
                self.errors.record();
                tracing::warn!(target: "pagepool.manager", group, %err, "keyword group reload failed");
            }
        }
    }

    /// Reloads one group's image samples.
    pub async fn reload_image_group(&self, group: i64) {
        let size = self.config.read().unwrap().images_size;
        match self.store.fetch_reusable(PoolKind::Images, group, size).await {
            Ok(rows) => self.reusable.load_images(group, rows),
            Err(err) => {
                self.errors.record();
                tracing::warn!(target: "pagepool.manager", group, %err, "image group reload failed");
            }
        }
    }

    /// Aggregated statistics across every component.
    pub async fn stats(&self) -> ManagerStats {
        ManagerStats {
            state: *self.state.lock().unwrap(),
            groups: self.groups.read().unwrap().clone(),
            errors_total: self.errors.total.load(Ordering::Relaxed),
            last_error_ago: self.errors.last_at.lock().unwrap().map(|t| t.elapsed()),
            cls: self.cls_ring.lock().await.stats(),
            url: self.url_ring.lock().await.stats(),
            title_gen: self.title_gen.stats(),
            keyword_emoji_gen: self.keyword_emoji_gen.stats(),
        }
    }

    /// Per-kind, per-group breakdown with the `"consumable"`/`"reusable"`
    /// discriminator dashboards need.
    pub fn data_pool_stats(&self) -> Vec<PoolStatEntry> {
        let mut entries = Vec::new();
        for entry in self.titles.iter() {
            entries.push(PoolStatEntry {
                kind: "titles",
                family: PoolFamily::Consumable,
                group: Some(*entry.key()),
                count: entry.value().len(),
                capacity: entry.value().capacity(),
            });
        }
        for entry in self.contents.iter() {
            entries.push(PoolStatEntry {
                kind: "contents",
                family: PoolFamily::Consumable,
                group: Some(*entry.key()),
                count: entry.value().len(),
                capacity: entry.value().capacity(),
            });
        }
        let (keywords_size, images_size) = {
            let config = self.config.read().unwrap();
            (config.keywords_size, config.images_size)
        };
        for group in self.reusable.keyword_groups() {
            entries.push(PoolStatEntry {
                kind: "keywords",
                family: PoolFamily::Reusable,
                group: Some(group),
                count: self.reusable.keyword_len(group),
                capacity: keywords_size,
            });
        }
        for group in self.reusable.image_groups() {
            entries.push(PoolStatEntry {
                kind: "images",
                family: PoolFamily::Reusable,
                group: Some(group),
                count: self.reusable.image_len(group),
                capacity: images_size,
            });
        }
        entries
    }

    /// Cancels background tasks, flushes the update batcher within a bounded
    /// grace period, and moves to `Stopped`.
    pub async fn stop(&self) {
        *self.state.lock().unwrap() = ManagerState::Stopping;
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
        self.cls_ring.lock().await.stop();
        self.url_ring.lock().await.stop();
        for entry in self.keyword_emoji_ring.iter() {
            entry.value().stop();
        }
        self.title_gen.stop();
        self.keyword_emoji_gen.stop();
        if let Some(batcher) = self.batcher.lock().await.take() {
            let _ = pagepool_runtime::Runtime::Tokio1.timeout(STOP_DRAIN_TIMEOUT, batcher.stop()).await;
        }
        *self.state.lock().unwrap() = ManagerState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusError;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct FakeStore {
        config: PoolConfig,
        titles: Vec<PoolItem>,
        keywords: Vec<String>,
        marked_used: StdMutex<Vec<(String, i64)>>,
    }

    #[async_trait]
    impl PoolStore for FakeStore {
        async fn load_config(&self) -> Result<PoolConfig, StoreError> {
            Ok(self.config.clone())
        }
        async fn fetch_batch(&self, kind: PoolKind, _group: i64, limit: usize) -> Result<Vec<PoolItem>, StoreError> {
            if kind != PoolKind::Titles {
                return Ok(Vec::new());
            }
            Ok(self.titles.iter().take(limit).cloned().collect())
        }
        async fn fetch_reusable(&self, kind: PoolKind, _group: i64, limit: usize) -> Result<Vec<String>, StoreError> {
            if kind != PoolKind::Keywords {
                return Ok(Vec::new());
            }
            Ok(self.keywords.iter().take(limit).cloned().collect())
        }
        async fn discover_groups(&self, _kind: PoolKind) -> Result<Vec<i64>, StoreError> {
            Ok(vec![1])
        }
        async fn mark_used(&self, table: &str, ids: &[i64]) -> Result<(), StoreError> {
            let mut guard = self.marked_used.lock().unwrap();
            for &id in ids {
                guard.push((table.to_string(), id));
            }
            Ok(())
        }
    }

    struct NeverBus {
        notify: Arc<Notify>,
    }

    #[async_trait]
    impl ReloadBus for NeverBus {
        async fn recv(&self) -> Result<ReloadMessage, BusError> {
            self.notify.notified().await;
            unreachable!("test bus never signals")
        }
    }

    fn small_config() -> PoolConfig {
        let mut cfg = PoolConfig {
            titles_size: 10,
            contents_size: 10,
            threshold: 2,
            refill_interval_ms: 10,
            keywords_size: 10,
            images_size: 10,
            refresh_interval_ms: 50,
            cls_pool_size: 8,
            url_pool_size: 8,
            keyword_emoji_ring_size: 8,
            ring_fill_fraction: 0.2,
            ..PoolConfig::default()
        };
        cfg.clamp();
        cfg
    }

    fn item(id: i64) -> PoolItem {
        PoolItem { id, text: format!("title-{id}") }
    }

    async fn start_manager(store: FakeStore) -> Arc<PoolManager> {
        let bus = Arc::new(NeverBus { notify: Arc::new(Notify::new()) });
        PoolManager::start(Arc::new(store), bus).await.unwrap()
    }

    #[tokio::test]
    async fn pop_title_drains_seeded_rows_and_marks_used() {
        let store = FakeStore {
            config: small_config(),
            titles: vec![item(1), item(2), item(3)],
            keywords: vec!["rust".to_string()],
            marked_used: StdMutex::new(Vec::new()),
        };
        let manager = start_manager(store).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let first = manager.pop_title(1).await.unwrap();
        assert_eq!(first, "title-1");
        manager.stop().await;
    }

    #[tokio::test]
    async fn invalid_group_is_rejected_before_touching_pools() {
        let store = FakeStore {
            config: small_config(),
            titles: vec![item(1)],
            keywords: vec!["rust".to_string()],
            marked_used: StdMutex::new(Vec::new()),
        };
        let manager = start_manager(store).await;
        let err = manager.pop(PoolKind::Titles, 0).await.unwrap_err();
        assert_eq!(err, PoolError::InvalidGroup(0));
        manager.stop().await;
    }

    #[tokio::test]
    async fn stop_rejects_subsequent_pops() {
        let store = FakeStore {
            config: small_config(),
            titles: vec![item(1)],
            keywords: vec!["rust".to_string()],
            marked_used: StdMutex::new(Vec::new()),
        };
        let manager = start_manager(store).await;
        manager.stop().await;
        let err = manager.pop(PoolKind::Cls, 1).await.unwrap_err();
        assert_eq!(err, PoolError::Stopped);
    }

    #[tokio::test]
    async fn cache_cls_never_errors_even_before_warmup_completes() {
        let store = FakeStore {
            config: small_config(),
            titles: vec![],
            keywords: vec!["rust".to_string()],
            marked_used: StdMutex::new(Vec::new()),
        };
        let manager = start_manager(store).await;
        let s = manager.cache_cls().await;
        assert!(!s.is_empty());
        manager.stop().await;
    }

    #[tokio::test]
    async fn keyword_with_emoji_falls_back_to_group_one() {
        let store = FakeStore {
            config: small_config(),
            titles: vec![],
            keywords: vec!["fallback-kw".to_string()],
            marked_used: StdMutex::new(Vec::new()),
        };
        let manager = start_manager(store).await;
        let s = manager.keyword_with_emoji(1).await.unwrap();
        assert!(!s.is_empty());
        manager.stop().await;
    }
}
