//! Per-group random-sample store for keywords and images (§4.3).
//!
//! Each group's raw and encoded slices are swapped as a whole, atomically,
//! under a fresh [`Arc`] so readers never observe a half-populated slice.
//! Backed by `dashmap` instead of a hand-rolled `RwLock<HashMap<_>>` so that
//! reloading one group's data never blocks a concurrent read of another's.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;

use crate::encode;
use crate::kind::FALLBACK_GROUP;
use crate::rng::{sample_owned, sample_without_replacement};

#[derive(Default)]
struct GroupData {
    raw: Vec<String>,
    encoded: Vec<String>,
}

/// Holds the random-sample pools for `keywords` and `images`, one entry per
/// group, refreshed periodically by [`crate::PoolManager`]'s refresh loop.
pub struct ReusableStore {
    keywords: DashMap<i64, Arc<GroupData>>,
    images: DashMap<i64, Arc<GroupData>>,
}

impl Default for ReusableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReusableStore {
    /// Creates an empty store. Callers insert the group 1 fallback entry at
    /// `Start`, per the group-keyed-structure invariant.
    pub fn new() -> Self {
        Self {
            keywords: DashMap::new(),
            images: DashMap::new(),
        }
    }

    /// Replaces group `group`'s keyword slice wholesale, storing both the
    /// raw and HTML-entity-encoded forms.
    pub fn load_keywords(&self, group: i64, raw: Vec<String>) {
        let encoded = raw.iter().map(|s| encode::encode(s)).collect();
        self.keywords.insert(group, Arc::new(GroupData { raw, encoded }));
    }

    /// Replaces group `group`'s image slice wholesale. Images are stored raw
    /// only; no encoded form is kept since image URLs are not rendered as
    /// scraped text.
    pub fn load_images(&self, group: i64, raw: Vec<String>) {
        self.images.insert(
            group,
            Arc::new(GroupData {
                raw,
                encoded: Vec::new(),
            }),
        );
    }

    fn group_or_fallback(map: &DashMap<i64, Arc<GroupData>>, group: i64) -> Option<Arc<GroupData>> {
        if let Some(data) = map.get(&group) {
            if !data.raw.is_empty() {
                return Some(data.clone());
            }
        }
        if group != FALLBACK_GROUP {
            if let Some(data) = map.get(&FALLBACK_GROUP) {
                if !data.raw.is_empty() {
                    return Some(data.clone());
                }
            }
        }
        None
    }

    /// Returns up to `count` pre-encoded keyword samples for `group`,
    /// falling back to group 1 when `group` has no data.
    pub fn get_random_keywords<R: Rng + ?Sized>(&self, group: i64, count: usize, rng: &mut R) -> Vec<String> {
        match Self::group_or_fallback(&self.keywords, group) {
            Some(data) => sample_owned(&data.encoded, count, rng),
            None => Vec::new(),
        }
    }

    /// Returns up to `count` raw (unescaped) keyword samples for `group`,
    /// falling back to group 1.
    pub fn get_raw_keywords<R: Rng + ?Sized>(&self, group: i64, count: usize, rng: &mut R) -> Vec<String> {
        match Self::group_or_fallback(&self.keywords, group) {
            Some(data) => sample_owned(&data.raw, count, rng),
            None => Vec::new(),
        }
    }

    /// Returns one random raw image URL for `group`, falling back to group 1.
    pub fn get_random_image<R: Rng + ?Sized>(&self, group: i64, rng: &mut R) -> Option<String> {
        let data = Self::group_or_fallback(&self.images, group)?;
        sample_without_replacement(&data.raw, 1, rng).into_iter().next().cloned()
    }

    /// Returns every raw image URL currently loaded for `group`, falling
    /// back to group 1.
    pub fn get_images(&self, group: i64) -> Vec<String> {
        Self::group_or_fallback(&self.images, group)
            .map(|d| d.raw.clone())
            .unwrap_or_default()
    }

    /// Known group ids that currently have keyword data loaded.
    pub fn keyword_groups(&self) -> Vec<i64> {
        self.keywords.iter().map(|e| *e.key()).collect()
    }

    /// Known group ids that currently have image data loaded.
    pub fn image_groups(&self) -> Vec<i64> {
        self.images.iter().map(|e| *e.key()).collect()
    }

    /// Number of keyword samples currently loaded for `group` (no fallback).
    pub fn keyword_len(&self, group: i64) -> usize {
        self.keywords.get(&group).map(|d| d.raw.len()).unwrap_or(0)
    }

    /// Number of image samples currently loaded for `group` (no fallback).
    pub fn image_len(&self, group: i64) -> usize {
        self.images.get(&group).map(|d| d.raw.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn falls_back_to_group_one_when_group_is_empty() {
        let store = ReusableStore::new();
        store.load_keywords(1, vec!["fallback".to_string()]);
        store.load_keywords(5, vec!["seo".to_string(), "rust".to_string()]);
        let mut rng = StdRng::seed_from_u64(1);

        let from_group_5 = store.get_raw_keywords(5, 1, &mut rng);
        assert!(from_group_5[0] == "seo" || from_group_5[0] == "rust");

        let from_missing_group_7 = store.get_raw_keywords(7, 1, &mut rng);
        assert_eq!(from_missing_group_7, vec!["fallback".to_string()]);
    }

    #[test]
    fn encoded_and_raw_forms_stay_aligned_on_load() {
        let store = ReusableStore::new();
        store.load_keywords(3, vec!["<tom & jerry>".to_string()]);
        let mut rng = StdRng::seed_from_u64(2);
        let raw = store.get_raw_keywords(3, 1, &mut rng);
        let encoded = store.get_random_keywords(3, 1, &mut rng);
        assert_eq!(raw[0], "<tom & jerry>");
        assert_eq!(encoded[0], "&lt;tom &amp; jerry&gt;");
    }

    #[test]
    fn returns_all_items_in_random_order_when_count_exceeds_len() {
        let store = ReusableStore::new();
        store.load_images(2, vec!["a.png".into(), "b.png".into(), "c.png".into()]);
        let images = store.get_images(2);
        assert_eq!(images.len(), 3);
    }

    #[test]
    fn reload_replaces_data_atomically() {
        let store = ReusableStore::new();
        store.load_keywords(1, vec!["old".to_string()]);
        store.load_keywords(1, vec!["new-a".to_string(), "new-b".to_string()]);
        let mut rng = StdRng::seed_from_u64(3);
        let sample = store.get_raw_keywords(1, 5, &mut rng);
        assert_eq!(sample.len(), 2);
        assert!(!sample.contains(&"old".to_string()));
    }
}
