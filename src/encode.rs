//! The HTML-entity encoder used to defeat naive scrapers. Encoded strings
//! are stored alongside raw ones in [`crate::reusable::ReusableStore`] for
//! fixed-cost reads, and every string the generator pool hands out is
//! encoded exactly once before it reaches the channel.

const AMP: &str = "&amp;";
const LT: &str = "&lt;";
const GT: &str = "&gt;";
const QUOT: &str = "&quot;";
const APOS: &str = "&#39;";

/// Escapes `&`, `<`, `>`, `"` and `'`. Restricted to that character class,
/// the encoder is idempotent: a string containing none of them is returned
/// unchanged, so encoding it again is a no-op.
pub fn encode(input: &str) -> String {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str(AMP),
            '<' => out.push_str(LT),
            '>' => out.push_str(GT),
            '"' => out.push_str(QUOT),
            '\'' => out.push_str(APOS),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_special_characters() {
        assert_eq!(encode("<b>Tom & Jerry</b>"), "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;");
        assert_eq!(encode(r#"say "hi""#), "say &quot;hi&quot;");
        assert_eq!(encode("it's"), "it&#39;s");
    }

    #[test]
    fn idempotent_for_safe_character_class() {
        let safe_strings = ["plain text", "keyword123", "no special chars here ✨"];
        for s in safe_strings {
            let once = encode(s);
            let twice = encode(&once);
            assert_eq!(once, twice);
            assert_eq!(once, s);
        }
    }

    #[test]
    fn leaves_unrelated_unicode_untouched() {
        assert_eq!(encode("emoji 🔥 stays"), "emoji 🔥 stays");
    }
}
