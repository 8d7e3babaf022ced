//! Bundled update scheduling.
//!
//! Bursty query-state churn (a user rapidly opening many threads) would
//! otherwise trigger one full subscription recomputation per change. The
//! bundler coalesces: invalidation requests arriving inside the sampling
//! window collapse into a single pass, and a request arriving while a pass
//! is already running is either dropped (`ignore_if_busy`) or queued for
//! the next window.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Configuration for the bundler.
#[derive(Debug, Clone)]
pub struct BundlerConfig {
    /// Sampling window: requests inside it collapse into one pass.
    pub interval: Duration,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
        }
    }
}

/// Debouncing scheduler that coalesces invalidation bursts.
#[derive(Clone)]
pub struct Bundler {
    inner: Arc<Inner>,
}

struct Inner {
    interval: Duration,
    /// A pass is queued for the current window.
    scheduled: AtomicBool,
    /// A pass is running right now.
    busy: AtomicBool,
}

impl Bundler {
    pub fn new(config: BundlerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                interval: config.interval,
                scheduled: AtomicBool::new(false),
                busy: AtomicBool::new(false),
            }),
        }
    }

    /// Request a recomputation pass.
    ///
    /// The first request in a window schedules `run` after the window
    /// elapses; later requests in the same window are absorbed. With
    /// `ignore_if_busy`, requests arriving while a pass executes are
    /// dropped outright.
    pub fn invalidate<F, Fut>(&self, ignore_if_busy: bool, run: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        if ignore_if_busy && inner.busy.load(Ordering::Acquire) {
            return;
        }
        if inner.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(inner.interval).await;
            inner.scheduled.store(false, Ordering::Release);
            inner.busy.store(true, Ordering::Release);
            run().await;
            inner.busy.store(false, Ordering::Release);
        });
    }

    /// Whether a pass is executing right now.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }
}

impl Default for Bundler {
    fn default() -> Self {
        Self::new(BundlerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> futures_util::future::Ready<()> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            futures_util::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_pass() {
        let bundler = Bundler::new(BundlerConfig {
            interval: Duration::from_millis(500),
        });
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            bundler.invalidate(false, counting_task(&runs));
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_run_separately() {
        let bundler = Bundler::new(BundlerConfig {
            interval: Duration::from_millis(500),
        });
        let runs = Arc::new(AtomicUsize::new(0));

        bundler.invalidate(false, counting_task(&runs));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        bundler.invalidate(false, counting_task(&runs));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignore_if_busy_drops_requests_mid_pass() {
        let bundler = Bundler::new(BundlerConfig {
            interval: Duration::from_millis(100),
        });
        let runs = Arc::new(AtomicUsize::new(0));

        // A slow pass that holds `busy` for a while.
        {
            let runs = Arc::clone(&runs);
            bundler.invalidate(false, move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
        }

        // Let the pass start executing.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(bundler.is_busy());

        // Dropped: the pass is busy and the caller opted out of queueing.
        bundler.invalidate(true, counting_task(&runs));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_pass_queues_next_window() {
        let bundler = Bundler::new(BundlerConfig {
            interval: Duration::from_millis(100),
        });
        let runs = Arc::new(AtomicUsize::new(0));

        {
            let runs = Arc::clone(&runs);
            bundler.invalidate(false, move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(bundler.is_busy());

        // Without ignore_if_busy the request lands in the next window.
        bundler.invalidate(false, counting_task(&runs));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
