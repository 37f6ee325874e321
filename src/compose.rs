//! Stable composition functions for the two kinds of generated strings:
//! decorated titles and keyword-with-emoji snippets.
//!
//! Both the `keyword_emoji` ring pool and the `keyword_emoji_gen` channel
//! generator call the same [`compose_keyword_emoji`] function. The two pools
//! stay separate because their fill behaviors differ (ring: fractional
//! low-mark; generator: absolute worker count), not because their content
//! differs.

use rand::Rng;

use crate::emoji;
use crate::encode;
use crate::reusable::ReusableStore;

const TITLE_TEMPLATES: &[&str] = &[
    "Top {kw1} Tips for {kw2}",
    "{kw1} vs {kw2}: The Ultimate Guide",
    "Why {kw1} Matters for {kw2}",
    "{kw1}: Everything You Need to Know",
    "How {kw1} Is Changing {kw2}",
    "The Complete {kw1} Checklist",
    "{kw1} Secrets Nobody Tells You About {kw2}",
    "Best {kw1} Strategies in 2024",
];

/// Composes a decorated title: a random template filled in with one or two
/// random raw keywords from `group` (falling back to group 1), followed by
/// one random emoji, then HTML-entity encoded once.
pub fn compose_title<R: Rng + ?Sized>(reusable: &ReusableStore, group: i64, rng: &mut R) -> String {
    let template = TITLE_TEMPLATES[rng.gen_range(0..TITLE_TEMPLATES.len())];
    let keywords = reusable.get_raw_keywords(group, 2, rng);
    let kw1 = keywords.first().cloned().unwrap_or_else(|| "your niche".to_string());
    let kw2 = keywords.get(1).cloned().unwrap_or_else(|| kw1.clone());
    let filled = template.replace("{kw1}", &kw1).replace("{kw2}", &kw2);
    let emoji = emoji::random_emoji(rng);
    encode::encode(&format!("{filled} {emoji}"))
}

/// Composes a keyword-with-emoji snippet: one raw keyword from `group`
/// (falling back to group 1), 1–2 emojis inserted at random interior
/// positions, then HTML-entity encoded once.
pub fn compose_keyword_emoji<R: Rng + ?Sized>(reusable: &ReusableStore, group: i64, rng: &mut R) -> String {
    let keyword = reusable
        .get_raw_keywords(group, 1, rng)
        .into_iter()
        .next()
        .unwrap_or_else(|| "keyword".to_string());
    let decorated = emoji::insert_emojis(&keyword, rng);
    encode::encode(&decorated)
}
