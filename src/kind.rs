/// The closed set of pool kinds a [`crate::PoolManager`] can serve.
///
/// `Titles`/`Contents` and `TitleGen` coexist on purpose: the former replays
/// rows from the relational store in insertion order, the latter produces
/// fresh decorated titles on the fly from the reusable keyword/emoji data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Consume-once database-sourced titles.
    Titles,
    /// Consume-once database-sourced body content.
    Contents,
    /// Randomly-reused keywords.
    Keywords,
    /// Randomly-reused images.
    Images,
    /// Ring-generated CSS class name artifacts.
    Cls,
    /// Ring-generated URL artifacts.
    Url,
    /// Ring-generated keyword-with-emoji artifacts.
    KeywordEmoji,
    /// Channel-generated pre-encoded titles.
    TitleGen,
    /// Channel-generated pre-encoded keyword-with-emoji strings.
    KeywordEmojiGen,
}

impl PoolKind {
    /// `true` for the two kinds that are consumed exactly once per row.
    pub fn is_consume_once(self) -> bool {
        matches!(self, PoolKind::Titles | PoolKind::Contents)
    }

    /// The relational table name backing this kind, for consume-once kinds.
    pub fn table_name(self) -> Option<&'static str> {
        match self {
            PoolKind::Titles => Some("titles"),
            PoolKind::Contents => Some("contents"),
            _ => None,
        }
    }
}

/// A single consume-once row: a database id paired with its text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolItem {
    /// Primary key of the originating row.
    pub id: i64,
    /// The row's text payload.
    pub text: String,
}

/// The universal fallback group. Group-keyed structures always carry an
/// entry under this key, inserted at `Start`, so a `Pop` has a non-error
/// path whenever data exists anywhere.
pub const FALLBACK_GROUP: i64 = 1;
