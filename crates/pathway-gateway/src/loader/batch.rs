//! The deferred-batch dispatcher.
//!
//! [`Batcher`] coalesces concurrent `load` calls for single keys into one
//! call to a batch function, with request-scoped memoization. On a
//! cooperative event loop the batch window would close when the microtask
//! queue drains; on a threaded runtime that boundary does not exist, so
//! the window is an equivalent logical tick: it opens on the first `load`
//! after the previous window closed, and closes when a short debounce
//! elapses or [`Batcher::flush`] is called explicitly. Loads enqueued
//! while the window is open share its single dispatch.
//!
//! Each request constructs its own `Batcher`, so memoization is
//! authoritative within a request and never leaks across requests.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{Mutex, oneshot};

use pathway_clients::ClientError;

/// Errors from the batching loader itself.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The batch function returned a result list whose length does not
    /// match the key list. Every key in the window is rejected with this;
    /// it indicates a bug in the batch function, not a runtime condition.
    #[error("Batch function returned {returned} results for {requested} keys")]
    ProtocolMismatch {
        /// Number of keys dispatched.
        requested: usize,
        /// Number of results returned.
        returned: usize,
    },

    /// The underlying backend call failed.
    #[error(transparent)]
    Backend(#[from] ClientError),

    /// The request was cancelled before this key's window opened.
    #[error("Request cancelled; no new batch windows")]
    Cancelled,

    /// The dispatch task disappeared without delivering a result.
    #[error("Batch dispatch failed: {0}")]
    Dispatch(String),
}

/// Result of loading one key: the value, absence, or a shared error.
///
/// Errors are `Arc`-shared because one failure can reject many waiters
/// and is memoized for the rest of the request.
pub type LoadResult<V> = Result<Option<V>, Arc<LoaderError>>;

/// A batch function: resolves a deduplicated key list in one backend call.
#[async_trait]
pub trait BatchFetch: Send + Sync + 'static {
    /// Loader key; equality is value equality and `Display` provides the
    /// stable string form used for memoization.
    type Key: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static;
    /// Loaded value.
    type Value: Clone + Send + Sync + 'static;

    /// Resolves `keys`, returning exactly one result per key in the same
    /// order. Per-key failures go in the inner `Result`; an outer `Err`
    /// rejects the whole window.
    async fn fetch(
        &self,
        keys: &[Self::Key],
    ) -> Result<Vec<Result<Option<Self::Value>, LoaderError>>, LoaderError>;
}

/// Memo slot for one key.
///
/// A key is entered as `InFlight` the moment it is enqueued, not when its
/// batch resolves, so a repeated load during dispatch subscribes to the
/// in-flight result instead of re-issuing the backend call.
enum MemoEntry<V> {
    /// Waiters for a key whose batch is open or mid-fetch.
    InFlight(Vec<oneshot::Sender<LoadResult<V>>>),
    /// The settled result, served to every later load.
    Resolved(LoadResult<V>),
}

struct State<K, V> {
    memo: HashMap<String, MemoEntry<V>>,
    /// Deduplicated keys of the open window, in first-request order.
    window: Option<Vec<K>>,
    /// Bumped whenever a window is taken, so a debounce task that lost a
    /// race with `flush` does not dispatch the next window early.
    generation: u64,
}

struct Inner<F: BatchFetch> {
    fetcher: F,
    delay: Duration,
    state: Mutex<State<F::Key, F::Value>>,
    cancelled: AtomicBool,
}

/// Per-request key coalescer with request-scoped memoization.
pub struct Batcher<F: BatchFetch> {
    inner: Arc<Inner<F>>,
}

impl<F: BatchFetch> Clone for Batcher<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: BatchFetch> Batcher<F> {
    /// Creates a batcher with the given debounce window.
    #[must_use]
    pub fn new(fetcher: F, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                delay,
                state: Mutex::new(State {
                    memo: HashMap::new(),
                    window: None,
                    generation: 0,
                }),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Loads one key.
    ///
    /// Settled results (values and errors alike) resolve immediately; a
    /// key that is already enqueued or mid-fetch gets the in-flight
    /// result; otherwise the key joins the open batch window, opening one
    /// if needed. Each key triggers at most one backend attempt per
    /// request. After cancellation no new window opens, but a window that
    /// is already open completes normally.
    pub async fn load(&self, key: F::Key) -> LoadResult<F::Value> {
        let memo_key = key.to_string();

        let rx = {
            let mut state = self.inner.state.lock().await;

            match state.memo.get_mut(&memo_key) {
                Some(MemoEntry::Resolved(result)) => return result.clone(),
                Some(MemoEntry::InFlight(waiters)) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
                None => {
                    let opening = state.window.is_none();
                    if opening && self.inner.cancelled.load(Ordering::SeqCst) {
                        return Err(Arc::new(LoaderError::Cancelled));
                    }

                    let (tx, rx) = oneshot::channel();
                    state.memo.insert(memo_key, MemoEntry::InFlight(vec![tx]));
                    state.window.get_or_insert_with(Vec::new).push(key);

                    if opening {
                        let generation = state.generation;
                        let inner = Arc::clone(&self.inner);
                        tokio::spawn(async move {
                            tokio::time::sleep(inner.delay).await;
                            Self::dispatch(&inner, Some(generation)).await;
                        });
                    }

                    rx
                }
            }
        };

        rx.await.unwrap_or_else(|_| {
            Err(Arc::new(LoaderError::Dispatch(
                "batch window dropped before completing".to_string(),
            )))
        })
    }

    /// Loads many keys with per-key result/error isolation.
    ///
    /// Results match the input order. All keys land in the same window
    /// when none of them is already memoized.
    pub async fn load_many(&self, keys: Vec<F::Key>) -> Vec<LoadResult<F::Value>> {
        join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Closes and dispatches the open window immediately.
    ///
    /// The explicit scheduling hook for callers that cannot rely on the
    /// debounce tick.
    pub async fn flush(&self) {
        Self::dispatch(&self.inner, None).await;
    }

    /// Drops one key from the request-scoped memo. The tiered cache is
    /// untouched. In-flight keys keep their waiters and settle normally.
    pub async fn clear(&self, key: &F::Key) {
        let mut state = self.inner.state.lock().await;
        let memo_key = key.to_string();
        if let Some(MemoEntry::Resolved(_)) = state.memo.get(&memo_key) {
            state.memo.remove(&memo_key);
        }
    }

    /// Drops every settled memo entry. The tiered cache is untouched.
    pub async fn clear_all(&self) {
        let mut state = self.inner.state.lock().await;
        state
            .memo
            .retain(|_, entry| matches!(entry, MemoEntry::InFlight(_)));
    }

    /// Marks the request cancelled: already-open windows complete (keeping
    /// the cache warm), but no further windows open.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    async fn dispatch(inner: &Arc<Inner<F>>, expected_generation: Option<u64>) {
        let keys = {
            let mut state = inner.state.lock().await;
            if let Some(generation) = expected_generation {
                if state.generation != generation {
                    // flush already dispatched this window.
                    return;
                }
            }
            let keys = state.window.take();
            if keys.is_some() {
                state.generation += 1;
            }
            keys
        };
        let Some(keys) = keys else { return };

        tracing::debug!(key_count = keys.len(), "Dispatching batch window");

        let results: Vec<LoadResult<F::Value>> = match inner.fetcher.fetch(&keys).await {
            Ok(results) if results.len() == keys.len() => results
                .into_iter()
                .map(|result| result.map_err(Arc::new))
                .collect(),
            Ok(results) => {
                tracing::error!(
                    requested = keys.len(),
                    returned = results.len(),
                    "Batch function returned mismatched result count"
                );
                let err = Arc::new(LoaderError::ProtocolMismatch {
                    requested: keys.len(),
                    returned: results.len(),
                });
                keys.iter().map(|_| Err(Arc::clone(&err))).collect()
            }
            Err(e) => {
                tracing::warn!(key_count = keys.len(), error = %e, "Batch function failed");
                let err = Arc::new(e);
                keys.iter().map(|_| Err(Arc::clone(&err))).collect()
            }
        };

        let mut state = inner.state.lock().await;
        for (key, result) in keys.iter().zip(results) {
            let previous = state
                .memo
                .insert(key.to_string(), MemoEntry::Resolved(result.clone()));
            if let Some(MemoEntry::InFlight(waiters)) = previous {
                for tx in waiters {
                    let _ = tx.send(result.clone());
                }
            }
        }
    }
}
