use thiserror::Error;

use crate::PoolKind;

/// Errors surfaced to render-time collaborators from [`crate::PoolManager::pop`]
/// and the convenience getters built on top of it.
///
/// This is the closed taxonomy described for the render path: transient and
/// background-loop failures never reach here, they are logged and retried on
/// the owning component's next tick instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No data is available for `group`, and the group 1 fallback (if
    /// different from `group`) was also empty or absent.
    #[error("pool {kind:?} has no data for group {group} (fallback group 1 also empty)")]
    Empty {
        /// The pool kind that was asked for.
        kind: PoolKind,
        /// The group id that was asked for.
        group: i64,
    },
    /// `group` was not a valid group id (currently: not positive).
    #[error("invalid group id: {0}")]
    InvalidGroup(i64),
    /// The [`crate::PoolManager`] is not in the `running` state.
    #[error("pool manager is not running")]
    Stopped,
}

/// Error returned by [`crate::PoolManager::start`] when a fatal, unrecoverable
/// condition prevents the manager from reaching the `running` state.
///
/// Unlike [`PoolError`], a `StartError` is expected to be fatal to the
/// process: the caller aborts startup rather than retrying.
#[derive(Debug, Error)]
pub enum StartError {
    /// The relational store could not be reached or returned an error while
    /// loading configuration or discovering groups.
    #[error("store unavailable during start: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Error returned while loading [`crate::PoolConfig`] from the environment or
/// an optional config file at bootstrap, before the first database round
/// trip is possible.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The underlying `config` crate failed to build or deserialize the
    /// layered configuration sources.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
