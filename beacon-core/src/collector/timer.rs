//! Periodic flush timer
//!
//! A tokio task that calls a tick function once per period. The timer owns
//! the task handle; stopping takes the handle out before aborting it, so a
//! timer is cancelled at most once no matter how often `stop` is called.
//! A tick that panics is logged and the timer keeps its schedule.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::plugins::panic_message;

/// Cancellable periodic task.
#[derive(Debug)]
pub struct FlushTimer {
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            handle: None,
        }
    }

    /// Start ticking, replacing any running task.
    ///
    /// The first tick fires one full period after the call. The task ends
    /// when `tick` returns false; a panicking tick is skipped. Returns false
    /// without starting anything when called outside a tokio runtime.
    pub fn start<F>(&mut self, mut tick: F) -> bool
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.stop();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No tokio runtime available; periodic flush disabled");
                return false;
            }
        };

        let period = self.period;
        self.handle = Some(runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match catch_unwind(AssertUnwindSafe(|| tick())) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!("Flush timer finished");
                        break;
                    }
                    Err(payload) => {
                        tracing::warn!(
                            panic = %panic_message(payload.as_ref()),
                            "Flush tick panicked; timer keeps running"
                        );
                    }
                }
            }
        }));
        true
    }

    /// Stop the task. Returns true if a task was running.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_tick(counter: &Arc<AtomicUsize>) -> impl FnMut() -> bool + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = FlushTimer::new(Duration::from_millis(50));
        assert!(timer.start(counter_tick(&ticks)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_exactly_once() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = FlushTimer::new(Duration::from_millis(50));
        timer.start(counter_tick(&ticks));

        assert!(timer.stop());
        assert!(!timer.stop());
        assert!(!timer.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_task() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = FlushTimer::new(Duration::from_millis(50));
        timer.start(counter_tick(&ticks));
        timer.start(counter_tick(&ticks));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_returning_false_ends_task() {
        let mut timer = FlushTimer::new(Duration::from_millis(50));
        timer.start(|| false);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_keeps_schedule() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut timer = FlushTimer::new(Duration::from_millis(50));
        timer.start(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("flush failed");
            }
            true
        });

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(timer.is_running());
    }

    #[test]
    fn test_start_without_runtime() {
        let mut timer = FlushTimer::new(Duration::from_millis(50));
        assert!(!timer.start(|| true));
        assert!(!timer.is_running());
        assert!(!timer.stop());
    }
}
