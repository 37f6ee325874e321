//! Tiny runtime-agnostic timeout helper shared by the pagepool crates.
//!
//! Background loops (refill, refresh, batcher flush, pub-sub listener) and
//! the render-time fallback paths all want the same "run this future, but
//! give up after a bounded duration" shape. This crate exists so the core
//! `pagepool` crate does not have to hard-code `tokio::time::timeout` at
//! every call site and so a future non-Tokio runtime can be added without
//! touching callers.

use std::future::Future;
use std::time::Duration;

/// The async runtime a [`Runtime::timeout`] call should be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Runtime {
    /// Use `tokio::time::timeout`.
    Tokio1,
}

impl Runtime {
    /// Runs `future`, returning `None` if `duration` elapses first.
    pub async fn timeout<F>(self, duration: Duration, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        match self {
            Runtime::Tokio1 => tokio::time::timeout(duration, future).await.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_before_deadline() {
        let result = Runtime::Tokio1
            .timeout(Duration::from_millis(50), async { 42 })
            .await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn times_out() {
        let result = Runtime::Tokio1
            .timeout(Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                42
            })
            .await;
        assert_eq!(result, None);
    }
}
