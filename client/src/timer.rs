//! Per-state timers.
//!
//! Every timeout is created through the [`Timers`] registry of the client,
//! which keeps count of the timers still alive.
//! A timer is released as soon as it is dropped,
//! so a state leaving its run routine releases all of its timers
//! before the next state begins.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use tokio::time::{Instant, Sleep};

#[derive(Debug, Clone, Default)]
pub(crate) struct Timers {
    live: Arc<AtomicUsize>,
}

impl Timers {
    /// Start a timer elapsing after the given duration.
    pub fn sleep(&self, duration: Duration) -> Timer {
        self.live.fetch_add(1, Ordering::SeqCst);
        Timer {
            sleep: Box::pin(tokio::time::sleep(duration)),
            _guard: TimerGuard {
                live: Arc::clone(&self.live),
            },
        }
    }

    /// The number of timers currently alive.
    pub fn active(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct TimerGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A registered timer, released on drop.
#[derive(Debug)]
pub(crate) struct Timer {
    sleep: Pin<Box<Sleep>>,
    _guard: TimerGuard,
}

impl Timer {
    /// Restart the timer to elapse after the given duration from now.
    pub fn reset(&mut self, duration: Duration) {
        self.sleep.as_mut().reset(Instant::now() + duration);
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.sleep.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::Timers;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn timers_are_released_on_drop() {
        let timers = Timers::default();
        let a = timers.sleep(Duration::from_millis(10));
        let b = timers.sleep(Duration::from_secs(10));
        assert_eq!(timers.active(), 2);

        a.await;
        assert_eq!(timers.active(), 1);
        drop(b);
        assert_eq!(timers.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_reset() {
        let timers = Timers::default();
        let mut timer = timers.sleep(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(8)).await;
        timer.reset(Duration::from_millis(10));

        let start = tokio::time::Instant::now();
        (&mut timer).await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
