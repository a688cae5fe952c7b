//! Restartable liveness deadline for one job.
//!
//! A job is not bounded by its total duration. Each progress boundary calls
//! [`Watchdog::kick`], which pushes the deadline to `now + timeout`; the job
//! only expires after `timeout` passes with no kick at all.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// The deadline passed without a kick. The supervised future has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    /// A browser instance was running when the deadline passed.
    pub browser_active: bool,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    timeout: Duration,
    deadline: Mutex<Instant>,
    browser_active: AtomicBool,
}

impl Watchdog {
    /// Arm a new watchdog; the first deadline is `now + timeout`.
    pub fn start(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                timeout,
                deadline: Mutex::new(Instant::now() + timeout),
                browser_active: AtomicBool::new(false),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn deadline(&self) -> Instant {
        *self.inner.deadline.lock()
    }

    /// Record progress.
    pub fn kick(&self) {
        *self.inner.deadline.lock() = Instant::now() + self.inner.timeout;
    }

    /// True while a browser instance is running for this job.
    pub fn browser_active(&self) -> bool {
        self.inner.browser_active.load(Ordering::Acquire)
    }

    /// Mark a browser instance as live until the guard drops.
    pub fn browser_session(&self) -> BrowserSession {
        self.inner.browser_active.store(true, Ordering::Release);
        BrowserSession {
            watchdog: self.clone(),
        }
    }

    /// Drive `fut` until it completes or the deadline lapses. On lapse the
    /// future is dropped, which kills any tool process it was awaiting.
    pub async fn supervise<F: Future>(&self, fut: F) -> Result<F::Output, Expired> {
        tokio::pin!(fut);
        loop {
            let deadline = self.deadline();
            tokio::select! {
                biased;
                out = &mut fut => return Ok(out),
                _ = tokio::time::sleep_until(deadline) => {
                    // a kick may have landed while we slept
                    if self.deadline() <= Instant::now() {
                        return Err(Expired {
                            browser_active: self.browser_active(),
                        });
                    }
                }
            }
        }
    }
}

/// Clears the browser-active flag on drop.
#[derive(Debug)]
pub struct BrowserSession {
    watchdog: Watchdog,
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.watchdog
            .inner
            .browser_active
            .store(false, Ordering::Release);
    }
}
