use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Tuning for a single channel-backed generator (title or keyword-emoji).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GeneratorConfig {
    /// Buffered channel capacity, per group.
    pub size: usize,
    /// Number of worker tasks feeding the channel, per group.
    pub workers: usize,
    /// Fraction of `size` above which workers pause (0.0–1.0).
    pub threshold_frac: f64,
    /// How long an idle worker sleeps before rechecking fill level.
    pub refill_ms: u64,
}

impl GeneratorConfig {
    fn clamp(&mut self, name: &str) {
        if !(0.0..=1.0).contains(&self.threshold_frac) {
            tracing::warn!(
                target: "pagepool.config",
                "{name}.threshold_frac {} out of range, clamping to 0.8",
                self.threshold_frac
            );
            self.threshold_frac = self.threshold_frac.clamp(0.0, 1.0);
        }
        if self.size == 0 {
            tracing::warn!(target: "pagepool.config", "{name}.size was 0, clamping to 1");
            self.size = 1;
        }
        if self.refill_ms == 0 {
            tracing::warn!(target: "pagepool.config", "{name}.refill_ms was 0, clamping to 1");
            self.refill_ms = 1;
        }
    }

    /// The worker poll interval as a [`Duration`].
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_ms)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            size: 64,
            workers: 2,
            threshold_frac: 0.8,
            refill_ms: 50,
        }
    }
}

/// The singleton pool configuration row (`pool_config`, §3).
///
/// All fields are integers unless noted, mirroring the relational schema.
/// Loaded either from the [`crate::store::PoolStore`] at steady state or,
/// as a bootstrap/fallback path, from environment variables and an optional
/// config file via the `config` crate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Capacity per group for the consume-once titles pool.
    pub titles_size: usize,
    /// Capacity per group for the consume-once contents pool.
    pub contents_size: usize,
    /// Absolute low-water mark below which a consume-once pool is refilled.
    pub threshold: usize,
    /// Tick period of the consume-once refill loop.
    pub refill_interval_ms: u64,
    /// Per-group sample size for the keywords reusable pool.
    pub keywords_size: usize,
    /// Per-group sample size for the images reusable pool.
    pub images_size: usize,
    /// Period of the reusable refresh loop.
    pub refresh_interval_ms: u64,
    /// Ring capacity for the `cls` kind.
    pub cls_pool_size: usize,
    /// Ring capacity for the `url` kind.
    pub url_pool_size: usize,
    /// Ring capacity for the `keyword_emoji` kind, per group.
    pub keyword_emoji_ring_size: usize,
    /// Fraction of ring capacity below which a ring pool triggers a refill.
    pub ring_fill_fraction: f64,
    /// Tuning for the `title_gen` channel generator.
    pub title_gen: GeneratorConfig,
    /// Tuning for the `keyword_emoji_gen` channel generator.
    pub keyword_emoji_gen: GeneratorConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            titles_size: 200,
            contents_size: 200,
            threshold: 40,
            refill_interval_ms: 2_000,
            keywords_size: 500,
            images_size: 200,
            refresh_interval_ms: 60_000,
            cls_pool_size: 1_000,
            url_pool_size: 1_000,
            keyword_emoji_ring_size: 500,
            ring_fill_fraction: 0.2,
            title_gen: GeneratorConfig::default(),
            keyword_emoji_gen: GeneratorConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Loads configuration from environment variables (prefix `POOL_`) and,
    /// if present, `pool.toml` in the current directory. This is the
    /// bootstrap path used before the first database round-trip and the
    /// fallback path when the store is unreachable at `Start`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&PoolConfig::default())?)
            .add_source(config::File::with_name("pool").required(false))
            .add_source(config::Environment::with_prefix("POOL").separator("__"));
        let mut cfg: PoolConfig = builder.build()?.try_deserialize()?;
        cfg.clamp();
        Ok(cfg)
    }

    /// Clamps every field to its legal range, logging a warning for each
    /// field that had to be adjusted. This is the misconfiguration policy
    /// from the error taxonomy: clamp and continue, never fail Start over a
    /// bad tuning value.
    pub fn clamp(&mut self) {
        for (name, field) in [
            ("titles_size", &mut self.titles_size),
            ("contents_size", &mut self.contents_size),
            ("keywords_size", &mut self.keywords_size),
            ("images_size", &mut self.images_size),
            ("cls_pool_size", &mut self.cls_pool_size),
            ("url_pool_size", &mut self.url_pool_size),
            ("keyword_emoji_ring_size", &mut self.keyword_emoji_ring_size),
        ] {
            if *field == 0 {
                tracing::warn!(target: "pagepool.config", "{name} was 0, clamping to 1");
                *field = 1;
            }
        }
        if !(0.0..=1.0).contains(&self.ring_fill_fraction) {
            tracing::warn!(
                target: "pagepool.config",
                "ring_fill_fraction {} out of range, clamping",
                self.ring_fill_fraction
            );
            self.ring_fill_fraction = self.ring_fill_fraction.clamp(0.0, 1.0);
        }
        if self.refill_interval_ms == 0 {
            self.refill_interval_ms = 1;
        }
        if self.refresh_interval_ms == 0 {
            self.refresh_interval_ms = 1;
        }
        self.title_gen.clamp("title_gen");
        self.keyword_emoji_gen.clamp("keyword_emoji_gen");
    }

    /// The consume-once refill tick period as a [`Duration`].
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    /// The reusable refresh tick period as a [`Duration`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Computes a field-level diff against `other`, used by the reload
    /// fan-out algorithm to apply only the minimal operation per changed
    /// component instead of a global restart.
    pub fn diff(&self, other: &PoolConfig) -> ConfigDiff {
        ConfigDiff {
            titles_size: self.titles_size != other.titles_size,
            contents_size: self.contents_size != other.contents_size,
            threshold: self.threshold != other.threshold,
            refill_interval_ms: self.refill_interval_ms != other.refill_interval_ms,
            keywords_size: self.keywords_size != other.keywords_size,
            images_size: self.images_size != other.images_size,
            refresh_interval_ms: self.refresh_interval_ms != other.refresh_interval_ms,
            cls_pool_size: self.cls_pool_size != other.cls_pool_size,
            url_pool_size: self.url_pool_size != other.url_pool_size,
            keyword_emoji_ring_size: self.keyword_emoji_ring_size != other.keyword_emoji_ring_size,
            ring_fill_fraction: self.ring_fill_fraction != other.ring_fill_fraction,
            title_gen: self.title_gen != other.title_gen,
            keyword_emoji_gen: self.keyword_emoji_gen != other.keyword_emoji_gen,
        }
    }
}

/// Which fields changed between two [`PoolConfig`] snapshots. Consumed by
/// [`crate::PoolManager::reload`] to decide, per component, whether a resize
/// suffices or a rebuild is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub titles_size: bool,
    pub contents_size: bool,
    pub threshold: bool,
    pub refill_interval_ms: bool,
    pub keywords_size: bool,
    pub images_size: bool,
    pub refresh_interval_ms: bool,
    pub cls_pool_size: bool,
    pub url_pool_size: bool,
    pub keyword_emoji_ring_size: bool,
    pub ring_fill_fraction: bool,
    pub title_gen: bool,
    pub keyword_emoji_gen: bool,
}

impl ConfigDiff {
    /// `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        *self == ConfigDiff::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_fixes_zero_sizes() {
        let mut cfg = PoolConfig {
            titles_size: 0,
            ring_fill_fraction: 4.0,
            ..PoolConfig::default()
        };
        cfg.clamp();
        assert_eq!(cfg.titles_size, 1);
        assert_eq!(cfg.ring_fill_fraction, 1.0);
    }

    #[test]
    fn diff_detects_single_field_change() {
        let a = PoolConfig::default();
        let mut b = a.clone();
        b.cls_pool_size = a.cls_pool_size + 1;
        let diff = a.diff(&b);
        assert!(diff.cls_pool_size);
        assert!(!diff.titles_size);
        assert!(!diff.is_empty());
    }

    #[test]
    fn no_diff_for_identical_configs() {
        let a = PoolConfig::default();
        let b = a.clone();
        assert!(a.diff(&b).is_empty());
    }
}
