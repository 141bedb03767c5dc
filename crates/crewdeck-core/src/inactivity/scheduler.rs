use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Work run once when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Source of one-shot timers.
pub trait Scheduler: Send + Sync {
    fn now(&self) -> Instant;

    /// Run `task` once after `delay` unless the returned handle is cancelled first.
    fn after(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Pending timer. Cancelled when dropped.
pub struct TimerHandle {
    _guard: DropGuard,
}

impl TimerHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            _guard: token.drop_guard(),
        }
    }

    pub fn cancel(self) {}
}

/// Timers backed by the Tokio runtime clock (pausable in tests).
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime the caller is running in.
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn after(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let deadline = Instant::now() + delay;

        self.handle.spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => task(),
            }
        });

        TimerHandle::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(counter: &Arc<AtomicUsize>) -> TimerTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let _timer = scheduler.after(Duration::from_secs(5), counting_task(&fired));

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = scheduler.after(Duration::from_secs(5), counting_task(&fired));
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timer_never_fires() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        drop(scheduler.after(Duration::from_secs(1), counting_task(&fired)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
