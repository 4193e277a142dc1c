//! Progress heartbeat for long external calls.
//!
//! The document-parse upload can take minutes. [`with_heartbeat`] runs a
//! ticker task next to the call that only reports elapsed time. The ticker is
//! owned by a guard: it is aborted and joined when the call finishes, on both
//! the `Ok` and `Err` paths, and aborted on drop if the caller itself is
//! cancelled.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

/// Owns the ticker task.
struct HeartbeatGuard {
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatGuard {
    fn start<T>(every: Duration, on_tick: T) -> Self
    where
        T: Fn(Duration) + Send + 'static,
    {
        if every.is_zero() {
            return Self { handle: None };
        }

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval_at(started + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                on_tick(started.elapsed());
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            // JoinError::Cancelled is the expected outcome.
            let _ = handle.await;
        }
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Await `fut`, calling `on_tick(elapsed)` every `every` until it completes.
///
/// A zero interval disables the ticker.
pub async fn with_heartbeat<F, T>(
    every: Duration,
    on_tick: impl Fn(Duration) + Send + 'static,
    fut: F,
) -> T
where
    F: Future<Output = T>,
{
    let guard = HeartbeatGuard::start(every, on_tick);
    let out = fut.await;
    guard.stop().await;
    out
}

/// Tick callback that logs `"<what> still running"` with elapsed seconds.
pub fn log_tick(what: &'static str) -> impl Fn(Duration) + Send + 'static {
    move |elapsed| info!(elapsed_secs = elapsed.as_secs(), "{what} still running")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(Duration) + Send + 'static) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&ticks);
        (ticks, move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_while_running_then_stops() {
        let (ticks, on_tick) = counter();

        let out = with_heartbeat(Duration::from_secs(10), on_tick, async {
            tokio::time::sleep(Duration::from_secs(35)).await;
            "parsed"
        })
        .await;

        assert_eq!(out, "parsed");
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_error_path() {
        let (ticks, on_tick) = counter();

        let out: Result<(), &str> = with_heartbeat(Duration::from_secs(5), on_tick, async {
            tokio::time::sleep(Duration::from_secs(12)).await;
            Err("upload failed")
        })
        .await;

        assert!(out.is_err());
        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_caller_aborts_ticker() {
        let (ticks, on_tick) = counter();

        let res = tokio::time::timeout(
            Duration::from_secs(25),
            with_heartbeat(Duration::from_secs(10), on_tick, async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }),
        )
        .await;

        assert!(res.is_err());
        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 2);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn zero_interval_never_ticks() {
        let (ticks, on_tick) = counter();
        let out = with_heartbeat(Duration::ZERO, on_tick, async { 1 }).await;
        assert_eq!(out, 1);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
