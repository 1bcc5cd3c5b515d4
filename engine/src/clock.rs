//! Repeating probe scheduler
//!
//! One [`ProbeClock`] per cadence. The action runs once immediately and then
//! every `period` until cancelled. Ticks never overlap for the same clock:
//! the action is awaited on the clock's own task and missed ticks are
//! skipped, not queued. Each invocation receives the generation token it was
//! spawned with so the owner can discard results from a stopped session.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

pub struct ProbeClock {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProbeClock {
    /// Spawn a clock that fires `action(token)` now and then every `period`.
    pub fn spawn<F, Fut>(period: Duration, token: u64, mut action: F) -> Self
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        if *stopped.borrow() {
                            break;
                        }
                        action(token).await;
                    }
                }
            }
            trace!(token, "probe clock stopped");
        });
        Self { shutdown, handle }
    }

    /// Request cancellation. Idempotent; an in-flight invocation is allowed
    /// to complete, its result is discarded by the caller via the token.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Cancel and wait for the clock task, including any in-flight
    /// invocation, to finish.
    pub async fn join(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fires_immediately_on_start() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let clock = ProbeClock::spawn(Duration::from_secs(60), 1, move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        clock.join().await;
    }

    #[tokio::test]
    async fn ticks_repeatedly_at_the_cadence() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let clock = ProbeClock::spawn(Duration::from_millis(25), 1, move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(260)).await;
        clock.join().await;
        let fired = count.load(Ordering::SeqCst);
        // ~10 expected for 260ms at 25ms; allow slack for scheduling noise
        assert!((5..=13).contains(&fired), "fired {fired} times");
    }

    #[tokio::test]
    async fn slow_action_skips_ticks_instead_of_queueing() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        // action takes ~3 periods; skipped ticks must not be replayed
        let clock = ProbeClock::spawn(Duration::from_millis(20), 1, move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(60)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        clock.join().await;
        let fired = count.load(Ordering::SeqCst);
        // 250ms / 60ms-per-invocation => about 4; queueing would give ~12
        assert!(fired <= 6, "expected skipped ticks, fired {fired} times");
        assert!(fired >= 2, "clock barely ran, fired {fired} times");
    }

    #[tokio::test]
    async fn cancel_stops_further_invocations_and_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let clock = ProbeClock::spawn(Duration::from_millis(10), 1, move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        clock.cancel();
        clock.cancel();
        clock.join().await;

        let after_cancel = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn join_waits_for_the_in_flight_invocation() {
        let done = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&done);
        let clock = ProbeClock::spawn(Duration::from_secs(60), 1, move |_| {
            let d = Arc::clone(&d);
            async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                d.fetch_add(1, Ordering::SeqCst);
            }
        });

        // first tick fires immediately and is still sleeping when we join
        tokio::time::sleep(Duration::from_millis(20)).await;
        clock.join().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn action_receives_its_token() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let clock = ProbeClock::spawn(Duration::from_secs(60), 42, move |token| {
            let s = Arc::clone(&s);
            async move {
                s.store(token as usize, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        clock.join().await;
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
