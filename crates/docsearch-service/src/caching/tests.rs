use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time;

use super::*;

/// Counts its refreshes and returns the number of earlier refreshes as the value.
///
/// Refreshes listed in `failing` return an error instead, and those listed in `panicking` panic.
#[derive(Default)]
struct Counter {
    calls: AtomicUsize,
    delay: Duration,
    failing: Vec<usize>,
    panicking: Vec<usize>,
}

impl Counter {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn failing_on(failing: Vec<usize>) -> Self {
        Self {
            failing,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Refresh for Counter {
    type Item = usize;

    fn refresh(&self, _previous: Option<usize>) -> BoxFuture<'_, CacheEntry<usize>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            if self.panicking.contains(&call) {
                panic!("refresh {call} panicked");
            }
            if self.failing.contains(&call) {
                return Err(CacheError::DownloadError(format!("refresh {call} failed")));
            }
            Ok(call)
        })
    }
}

/// Returns the previous value on every refresh after the first, like a stale fallback.
struct KeepsPrevious;

impl Refresh for KeepsPrevious {
    type Item = Arc<str>;

    fn refresh(&self, previous: Option<Arc<str>>) -> BoxFuture<'_, CacheEntry<Arc<str>>> {
        Box::pin(async move { Ok(previous.unwrap_or_else(|| Arc::from("first"))) })
    }
}

#[tokio::test]
async fn test_concurrent_gets_share_one_refresh() {
    time::pause();
    let cache = TimedCache::new(
        Counter::with_delay(Duration::from_millis(10)),
        Duration::from_secs(60),
    );

    let res = futures::join!(cache.get(), cache.get(), cache.get(), cache.get());
    assert_eq!(res, (Ok(0), Ok(0), Ok(0), Ok(0)));
    assert_eq!(cache.refresher().calls(), 1);
}

#[tokio::test]
async fn test_concurrent_gets_share_one_failure() {
    time::pause();
    let cache = TimedCache::new(
        Counter {
            delay: Duration::from_millis(10),
            failing: vec![0],
            ..Default::default()
        },
        Duration::from_secs(60),
    );

    let res = futures::join!(cache.get(), cache.get(), cache.get());
    let expected = Err(CacheError::DownloadError("refresh 0 failed".into()));
    assert_eq!(res, (expected.clone(), expected.clone(), expected));
    assert_eq!(cache.refresher().calls(), 1);
}

#[tokio::test]
async fn test_ttl() {
    time::pause();
    let cache = TimedCache::new(Counter::default(), Duration::from_secs(60));

    assert_eq!(cache.get().await, Ok(0));
    assert!(cache.is_fresh());

    time::advance(Duration::from_secs(59)).await;
    assert_eq!(cache.get().await, Ok(0));
    assert_eq!(cache.refresher().calls(), 1);

    time::advance(Duration::from_secs(1)).await;
    assert!(!cache.is_fresh());
    let res = futures::join!(cache.get(), cache.get());
    assert_eq!(res, (Ok(1), Ok(1)));
    assert_eq!(cache.refresher().calls(), 2);

    assert_eq!(cache.get().await, Ok(1));
    assert_eq!(cache.refresher().calls(), 2);
}

#[tokio::test]
async fn test_failed_refresh_keeps_value_and_deadline() {
    time::pause();
    let cache = TimedCache::new(Counter::failing_on(vec![1]), Duration::from_secs(60));

    assert_eq!(cache.get().await, Ok(0));
    time::advance(Duration::from_secs(60)).await;

    assert_eq!(
        cache.get().await,
        Err(CacheError::DownloadError("refresh 1 failed".into()))
    );
    // The deadline was not advanced, so the next call retries right away.
    assert!(!cache.is_fresh());
    assert_eq!(cache.get().await, Ok(2));
    assert_eq!(cache.refresher().calls(), 3);
}

#[tokio::test]
async fn test_first_failure_propagates() {
    time::pause();
    let cache = TimedCache::new(Counter::failing_on(vec![0]), Duration::from_secs(60));

    assert!(cache.get().await.is_err());
    assert!(!cache.is_fresh());
    assert_eq!(cache.get().await, Ok(1));
}

#[tokio::test]
async fn test_previous_value_restarts_ttl() {
    time::pause();
    let cache = TimedCache::new(KeepsPrevious, Duration::from_secs(60));

    assert_eq!(&*cache.get().await.unwrap(), "first");
    time::advance(Duration::from_secs(60)).await;
    assert!(!cache.is_fresh());

    assert_eq!(&*cache.get().await.unwrap(), "first");
    assert!(cache.is_fresh());
}

#[tokio::test]
async fn test_cancelled_caller_does_not_cancel_refresh() {
    time::pause();
    let cache = TimedCache::new(
        Counter::with_delay(Duration::from_millis(10)),
        Duration::from_secs(60),
    );

    let waiter = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get().await }
    });
    // Let the waiter start the refresh, then abandon it.
    tokio::task::yield_now().await;
    time::advance(Duration::from_millis(1)).await;
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    assert_eq!(cache.get().await, Ok(0));
    assert_eq!(cache.refresher().calls(), 1);
}

#[tokio::test]
async fn test_clones_share_state() {
    time::pause();
    let cache = TimedCache::new(Counter::default(), Duration::from_secs(60));
    let other = cache.clone();

    assert_eq!(cache.get().await, Ok(0));
    assert_eq!(other.get().await, Ok(0));
    assert_eq!(other.refresher().calls(), 1);
}

#[tokio::test]
async fn test_panicking_refresh_fails_waiters() {
    time::pause();
    let cache = TimedCache::new(
        Counter {
            delay: Duration::from_millis(10),
            panicking: vec![0],
            ..Default::default()
        },
        Duration::from_secs(60),
    );

    let res = futures::join!(cache.get(), cache.get(), cache.get());
    let expected = Err(CacheError::InternalError);
    assert_eq!(res, (expected.clone(), expected.clone(), expected));
    assert_eq!(cache.refresher().calls(), 1);

    // The marker was cleared, so the next call starts a new refresh.
    assert_eq!(cache.get().await, Ok(1));
    assert!(cache.is_fresh());
}

#[test]
fn test_get_outside_runtime_panics() {
    let cache = TimedCache::new(Counter::default(), Duration::from_secs(60));

    let (sender, receiver) = mpsc::channel();
    thread::spawn({
        let cache = cache.clone();
        move || {
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| futures::executor::block_on(cache.get())));
            sender.send(result.is_err()).ok();
        }
    });

    let panicked = receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("get did not return");
    assert!(panicked);
    assert!(cache.state.lock().in_flight.is_none());
    assert_eq!(cache.refresher().calls(), 0);
}
