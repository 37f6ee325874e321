//! The relational-store collaborator trait (§6 External Interfaces). The
//! core crate depends only on this trait; `pagepool-postgres` provides the
//! concrete `sqlx`-backed implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::PoolConfig;
use crate::kind::{PoolItem, PoolKind};

/// Errors a [`PoolStore`] implementation can surface. The core never
/// inspects these beyond logging them: every caller treats a `StoreError`
/// as "this round failed, retry next tick" except at `Start`, where it is
/// wrapped into [`crate::errors::StartError`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing connection pool or driver reported an error.
    #[error("store backend error: {0}")]
    Backend(#[source] anyhow::Error),
    /// A caller asked for a table name outside the update allowlist.
    #[error("table {0:?} is not in the update allowlist")]
    DisallowedTable(String),
}

/// The relational collaborator the core pool machinery reads from and
/// writes consume-marks to. Implemented by `pagepool-postgres` against
/// `sqlx::PgPool`; test doubles implement it directly for unit tests.
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Loads the singleton `pool_config` row.
    async fn load_config(&self) -> Result<PoolConfig, StoreError>;

    /// Fetches up to `limit` active rows of `kind` for `group`, ordered
    /// `(batch_id DESC, id ASC)` — an arbitrary but stable tie-break, not a
    /// batch-semantics guarantee. Only meaningful for consume-once kinds.
    async fn fetch_batch(&self, kind: PoolKind, group: i64, limit: usize) -> Result<Vec<PoolItem>, StoreError>;

    /// Fetches up to `limit` active rows of `kind` (`Keywords` or `Images`)
    /// for `group`, database-side randomized (`ORDER BY RAND()`).
    async fn fetch_reusable(&self, kind: PoolKind, group: i64, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Lists known group ids for `kind` from the relevant enumeration table
    /// (`keyword_groups` or `image_groups`). Callers fall back to `[1]` on
    /// error.
    async fn discover_groups(&self, kind: PoolKind) -> Result<Vec<i64>, StoreError>;

    /// Marks `ids` as `status='used'` in `table`. Implementations must
    /// reject any `table` not on their own allowlist rather than trust the
    /// caller — the batcher checks too, but the store is the last line of
    /// defense against query interpolation.
    async fn mark_used(&self, table: &str, ids: &[i64]) -> Result<(), StoreError>;
}
