//! A small static emoji pool used to decorate generated titles and
//! keyword-with-emoji strings.

use rand::Rng;

const EMOJIS: &[&str] = &[
    "😀", "😁", "😂", "😉", "😍", "🤩", "😎", "🤔", "👍", "👏", "🙌", "💪", "🔥", "✨", "⭐", "💡",
    "📈", "🚀", "🎯", "✅", "💯", "🏆", "🎉", "👀", "💰", "📌", "🧠", "⚡", "🌟", "🔔",
];

/// Returns one emoji uniformly at random.
pub fn random_emoji<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    EMOJIS[rng.gen_range(0..EMOJIS.len())]
}

/// Returns one emoji uniformly at random, excluding any already in `exclude`.
/// If every emoji is excluded, falls back to the first entry rather than
/// failing the render path.
pub fn random_emoji_exclude<R: Rng + ?Sized>(rng: &mut R, exclude: &[&str]) -> &'static str {
    let candidates: Vec<&'static str> = EMOJIS
        .iter()
        .copied()
        .filter(|e| !exclude.contains(e))
        .collect();
    if candidates.is_empty() {
        return EMOJIS[0];
    }
    candidates[rng.gen_range(0..candidates.len())]
}

/// Inserts 1–2 emojis at random char-boundary-safe interior positions of
/// `text`, 50/50 between one and two, as described for keyword-with-emoji
/// composition.
pub fn insert_emojis<R: Rng + ?Sized>(text: &str, rng: &mut R) -> String {
    let count = if rng.gen_bool(0.5) { 1 } else { 2 };
    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).chain([text.len()]).collect();
    let mut positions: Vec<usize> = (0..count)
        .map(|_| boundaries[rng.gen_range(0..boundaries.len())])
        .collect();
    positions.sort_unstable();
    positions.dedup();

    let mut out = String::with_capacity(text.len() + count * 5);
    let mut last = 0;
    for pos in positions {
        out.push_str(&text[last..pos]);
        out.push(' ');
        out.push_str(random_emoji(rng));
        last = pos;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_emoji_is_from_the_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let e = random_emoji(&mut rng);
            assert!(EMOJIS.contains(&e));
        }
    }

    #[test]
    fn exclude_avoids_excluded_set() {
        let mut rng = StdRng::seed_from_u64(1);
        let exclude: Vec<&str> = EMOJIS[..EMOJIS.len() - 1].to_vec();
        for _ in 0..20 {
            let e = random_emoji_exclude(&mut rng, &exclude);
            assert_eq!(e, EMOJIS[EMOJIS.len() - 1]);
        }
    }

    #[test]
    fn insert_emojis_preserves_original_text_as_subsequence() {
        let original = "hello world";
        let mut rng = StdRng::seed_from_u64(3);
        let decorated = insert_emojis(original, &mut rng);
        assert!(decorated.len() >= original.len());

        let mut remaining = original.chars().peekable();
        for c in decorated.chars() {
            if remaining.peek() == Some(&c) {
                remaining.next();
            }
        }
        assert!(remaining.peek().is_none(), "original text was not preserved as a subsequence");
    }
}
