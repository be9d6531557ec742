//! Single-flight memoization of slow, fallible fetches
//!
//! A [`Memo`] moves through `Unfetched -> InFlight -> Ready`, or
//! `InFlight -> Failed` when the fetch errors. Concurrent callers that find
//! the memo in flight await the same shared future. A failed memo is reset
//! to `Unfetched` by the next call, which starts a fresh fetch.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::debug;

use crate::error::FetchError;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<T>, FetchError>>>;

enum MemoState<T> {
    Unfetched,
    InFlight(SharedFetch<T>),
    Ready(Arc<T>),
    Failed(FetchError),
}

/// Observable state of a memo, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoStatus {
    Unfetched,
    InFlight,
    Ready,
    Failed,
}

/// A value fetched at most once per session, with reset-on-failure
pub struct Memo<T> {
    label: String,
    state: Mutex<MemoState<T>>,
}

impl<T> std::fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("label", &self.label)
            .field("status", &self.status())
            .finish()
    }
}

impl<T> Memo<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(MemoState::Unfetched),
        }
    }

    /// Memo already holding a value
    pub fn ready(label: impl Into<String>, value: T) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(MemoState::Ready(Arc::new(value))),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    // The lock is never held across an await, so a poisoned guard still
    // protects a consistent state.
    fn lock(&self) -> MutexGuard<'_, MemoState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> MemoStatus {
        match &*self.lock() {
            MemoState::Unfetched => MemoStatus::Unfetched,
            MemoState::InFlight(_) => MemoStatus::InFlight,
            MemoState::Ready(_) => MemoStatus::Ready,
            MemoState::Failed(_) => MemoStatus::Failed,
        }
    }

    /// The value, if a fetch has completed successfully
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.lock() {
            MemoState::Ready(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }
}

impl<T: Send + Sync + 'static> Memo<T> {
    /// Return the memoized value, joining or starting a fetch if needed.
    ///
    /// `fetch` is only invoked when no value is ready and nothing is in
    /// flight.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<T>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let shared = {
            let mut state = self.lock();
            let joined = match &*state {
                MemoState::Ready(value) => return Ok(Arc::clone(value)),
                MemoState::InFlight(shared) => Some(shared.clone()),
                MemoState::Failed(err) => {
                    debug!(memo = %self.label, error = %err, "resetting failed memo");
                    None
                }
                MemoState::Unfetched => None,
            };
            match joined {
                Some(shared) => shared,
                None => {
                    let shared = fetch().map(|result| result.map(Arc::new)).boxed().shared();
                    *state = MemoState::InFlight(shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        let mut state = self.lock();
        // Only the fetch that is still current may settle the memo.
        if let MemoState::InFlight(current) = &*state
            && current.ptr_eq(&shared)
        {
            *state = match &result {
                Ok(value) => MemoState::Ready(Arc::clone(value)),
                Err(err) => MemoState::Failed(err.clone()),
            };
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let memo = Memo::new("commit");
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, FetchError>("abc".to_string())
            }
        };

        let (a, b, c) = tokio::join!(
            memo.get_or_fetch(fetch),
            memo.get_or_fetch(fetch),
            memo.get_or_fetch(fetch)
        );
        assert_eq!(*a.unwrap(), "abc");
        assert_eq!(*b.unwrap(), "abc");
        assert_eq!(*c.unwrap(), "abc");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.status(), MemoStatus::Ready);
    }

    #[tokio::test]
    async fn test_ready_is_never_refetched() {
        let memo = Memo::ready("file", 7u32);
        let value = memo
            .get_or_fetch(|| async { Err(FetchError::new("file", "should not run")) })
            .await
            .unwrap();
        assert_eq!(*value, 7);
    }

    #[tokio::test]
    async fn test_failure_resets_for_next_call() {
        let memo: Memo<String> = Memo::new("tree");

        let err = memo
            .get_or_fetch(|| async { Err(FetchError::new("tree", "connection reset")) })
            .await
            .unwrap_err();
        assert_eq!(err.reason, "connection reset");
        assert_eq!(memo.status(), MemoStatus::Failed);
        assert!(memo.get().is_none());

        let value = memo
            .get_or_fetch(|| async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(*value, "fresh");
        assert_eq!(memo.status(), MemoStatus::Ready);
    }

    #[tokio::test]
    async fn test_waiters_all_see_the_failure() {
        let memo: Memo<String> = Memo::new("commit");
        let fetch = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(FetchError::new("commit", "404"))
        };
        let (a, b) = tokio::join!(memo.get_or_fetch(fetch), memo.get_or_fetch(fetch));
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(memo.status(), MemoStatus::Failed);
    }
}
