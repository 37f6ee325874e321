//! RNG helpers shared by the reusable store, the ring pools and the
//! generator workers: uniform sampling without replacement, and the small
//! random tokens that make up generated CSS class names and URLs.

use std::collections::HashMap;

use rand::Rng;

/// Samples `count` items from `source` without replacement, returning
/// references in random order. Never mutates or copies `source` itself: a
/// partial Fisher-Yates shuffle is carried out over a swap-map so only the
/// `count` positions actually drawn are ever touched.
///
/// If `count >= source.len()`, every item is returned, in random order.
pub fn sample_without_replacement<'a, T, R: Rng + ?Sized>(
    source: &'a [T],
    count: usize,
    rng: &mut R,
) -> Vec<&'a T> {
    let n = source.len();
    if n == 0 {
        return Vec::new();
    }
    let k = count.min(n);
    let mut swap: HashMap<usize, usize> = HashMap::with_capacity(k);
    let mut out = Vec::with_capacity(k);
    for i in 0..k {
        let j = if i + 1 < n {
            rng.gen_range(i..n)
        } else {
            i
        };
        let val_i = *swap.get(&i).unwrap_or(&i);
        let val_j = *swap.get(&j).unwrap_or(&j);
        swap.insert(i, val_j);
        swap.insert(j, val_i);
        out.push(&source[val_j]);
    }
    out
}

/// Samples `count` owned clones from `source` without replacement. A thin
/// convenience wrapper around [`sample_without_replacement`] for the string
/// pools, which hand owned `String`s back to render-time callers.
pub fn sample_owned<R: Rng + ?Sized>(source: &[String], count: usize, rng: &mut R) -> Vec<String> {
    sample_without_replacement(source, count, rng)
        .into_iter()
        .cloned()
        .collect()
}

const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const CLASS_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

fn random_token<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Generates a plausible CSS class name, e.g. `cls-q7wkzna`.
pub fn random_css_class<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.gen_range(5..=9);
    format!("cls-{}", random_token(rng, CLASS_ALPHABET, len))
}

/// Generates a plausible relative URL path, e.g. `/p/9f3ak2-q7wkzna.html`.
pub fn random_url_path<R: Rng + ?Sized>(rng: &mut R) -> String {
    let slug = random_token(rng, SLUG_ALPHABET, rng.gen_range(4..=8));
    let suffix = random_token(rng, SLUG_ALPHABET, rng.gen_range(4..=8));
    format!("/p/{slug}-{suffix}.html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn samples_all_when_count_exceeds_len() {
        let source = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut rng = StdRng::seed_from_u64(1);
        let sample = sample_owned(&source, 10, &mut rng);
        assert_eq!(sample.len(), 3);
        let set: HashSet<_> = sample.into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn samples_without_duplicates() {
        let source: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let sample = sample_owned(&source, 10, &mut rng);
        assert_eq!(sample.len(), 10);
        let set: HashSet<_> = sample.iter().cloned().collect();
        assert_eq!(set.len(), 10);
    }

    #[test]
    fn sampling_uniformity_over_many_draws() {
        let source: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = HashMap::new();
        let trials = 200_000;
        for _ in 0..trials {
            let sample = sample_owned(&source, 1, &mut rng);
            *counts.entry(sample[0].clone()).or_insert(0u64) += 1;
        }
        let expected = trials as f64 / source.len() as f64;
        for value in &source {
            let observed = *counts.get(value).unwrap_or(&0) as f64;
            let deviation = (observed - expected).abs() / expected;
            assert!(deviation < 0.05, "deviation {deviation} too high for {value}");
        }
    }

    #[test]
    fn css_class_and_url_are_nonempty_and_distinct_enough() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = random_css_class(&mut rng);
        let b = random_css_class(&mut rng);
        assert!(a.starts_with("cls-"));
        assert_ne!(a, b);
        let url = random_url_path(&mut rng);
        assert!(url.starts_with("/p/"));
        assert!(url.ends_with(".html"));
    }
}
