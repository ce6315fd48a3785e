//! A time-bounded cache for a single expensive value.
//!
//! The [`TimedCache`] holds at most one value together with a freshness deadline. A stale or
//! missing value is recomputed through the [`Refresh`] implementation the cache was created
//! with. Concurrent lookups of a stale value are coalesced: exactly one refresh runs, and every
//! caller that asked for the value in the meantime receives the outcome of that refresh.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use parking_lot::Mutex;
use sentry::{Hub, SentryFutureExt};
use tokio::time::Instant;

mod cache_error;

pub use cache_error::{CacheEntry, CacheError};

type ComputationChannel<T> = Shared<oneshot::Receiver<CacheEntry<T>>>;

/// Recomputes the value held by a [`TimedCache`].
pub trait Refresh: Send + Sync + 'static {
    /// The value produced by a refresh.
    ///
    /// This is cloned for every caller, so it should be cheap to clone, for example an `Arc`.
    type Item: Clone + Send + Sync + 'static;

    /// Computes a new value.
    ///
    /// `previous` is the value the cache currently holds, if any. Implementations may return it
    /// instead of failing, in which case the cache treats it like a freshly computed value and
    /// restarts its time-to-live.
    fn refresh(&self, previous: Option<Self::Item>) -> BoxFuture<'_, CacheEntry<Self::Item>>;
}

struct CacheState<T> {
    /// The last successfully refreshed value.
    value: Option<T>,
    /// `value` is fresh while `now < expires_at`.
    expires_at: Instant,
    /// The currently running refresh, if any.
    in_flight: Option<ComputationChannel<T>>,
}

impl<T: Clone> CacheState<T> {
    fn fresh_value(&self, now: Instant) -> Option<T> {
        if now < self.expires_at {
            self.value.clone()
        } else {
            None
        }
    }
}

/// Clears the in-flight marker when dropped.
///
/// This also happens when the refresh panics, or when its task is dropped before completion.
struct ClearInFlight<T>(Arc<Mutex<CacheState<T>>>);

impl<T> Drop for ClearInFlight<T> {
    fn drop(&mut self) {
        self.0.lock().in_flight = None;
    }
}

/// Caches the value produced by a [`Refresh`] for a fixed time-to-live.
///
/// Cloning the cache is cheap, and all clones share the same value and in-flight refresh.
///
/// Refreshes are spawned onto the current tokio runtime, so [`get`](Self::get) has to be called
/// from within a runtime. Because the refresh is its own task, dropping a caller that waits on
/// it does not cancel the refresh for anybody else.
pub struct TimedCache<R: Refresh> {
    refresher: Arc<R>,
    ttl: Duration,
    state: Arc<Mutex<CacheState<R::Item>>>,
}

impl<R: Refresh> Clone for TimedCache<R> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            refresher: Arc::clone(&self.refresher),
            ttl: self.ttl,
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Refresh> fmt::Debug for TimedCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (has_value, refreshing) = self
            .state
            .try_lock()
            .map(|state| (state.value.is_some(), state.in_flight.is_some()))
            .unwrap_or_default();
        f.debug_struct("TimedCache")
            .field("ttl", &self.ttl)
            .field("has_value", &has_value)
            .field("refreshing", &refreshing)
            .finish()
    }
}

impl<R: Refresh> TimedCache<R> {
    /// Creates an empty cache that keeps refreshed values for `ttl`.
    pub fn new(refresher: R, ttl: Duration) -> Self {
        let state = CacheState {
            value: None,
            expires_at: Instant::now(),
            in_flight: None,
        };

        Self {
            refresher: Arc::new(refresher),
            ttl,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// The [`Refresh`] this cache was created with.
    pub fn refresher(&self) -> &R {
        &self.refresher
    }

    /// Whether [`get`](Self::get) would currently return without refreshing.
    pub fn is_fresh(&self) -> bool {
        self.state.lock().fresh_value(Instant::now()).is_some()
    }

    /// Returns the cached value, refreshing it first if it is missing or stale.
    ///
    /// If a refresh is already running, this waits for that refresh instead of starting another
    /// one. A failed refresh leaves the cached value and its deadline untouched and is returned
    /// to every waiting caller.
    pub async fn get(&self) -> CacheEntry<R::Item> {
        let (channel, computation) = {
            let mut state = self.state.lock();
            if let Some(value) = state.fresh_value(Instant::now()) {
                return Ok(value);
            }

            match &state.in_flight {
                Some(channel) => {
                    // A concurrent refresh was deduplicated.
                    metric!(counter("caches.refresh.joined") += 1);
                    (channel.clone(), None)
                }
                None => {
                    metric!(counter("caches.refresh.started") += 1);
                    let (channel, computation) = self.create_refresh(state.value.clone());
                    state.in_flight = Some(channel.clone());
                    (channel, Some(computation))
                }
            }
        };

        // Spawned without the lock held: a task rejected by the runtime is dropped right away,
        // and its guard needs the lock to clear the marker.
        if let Some(computation) = computation {
            tokio::spawn(computation);
        }

        channel
            .unwrap_or_else(|_cancelled| {
                tracing::error!("refresh task dropped without a result");
                Err(CacheError::InternalError)
            })
            .await
    }

    /// Creates a refresh and a channel that all interested callers can await.
    ///
    /// The channel must be stored as the in-flight marker before the refresh is spawned.
    fn create_refresh(
        &self,
        previous: Option<R::Item>,
    ) -> (ComputationChannel<R::Item>, BoxFuture<'static, ()>) {
        let (sender, receiver) = oneshot::channel();

        let refresher = Arc::clone(&self.refresher);
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;

        let clear_in_flight = ClearInFlight(Arc::clone(&self.state));

        let computation = async move {
            let result = refresher.refresh(previous).await;

            if let Ok(value) = &result {
                let mut state = state.lock();
                state.value = Some(value.clone());
                state.expires_at = Instant::now() + ttl;
            }

            // Clear the marker before publishing. Callers either joined this channel already,
            // or they observe the committed value, or they start a new refresh.
            drop(clear_in_flight);
            sender.send(result).ok();
        }
        .bind_hub(Hub::new_from_top(Hub::current()));

        (receiver.shared(), computation.boxed())
    }
}

#[cfg(test)]
mod tests;
