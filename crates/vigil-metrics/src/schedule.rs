//! Fixed-period, drift-compensated background loops.
//!
//! [`run_every`] measures how long each tick took and sleeps only the
//! remainder of the interval. A tick that overruns its interval is followed
//! immediately by the next one; lag is never accumulated. Loops stop
//! cooperatively: the stop signal is only observed between ticks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// A fixed tick period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
}

impl Schedule {
    /// Creates a schedule with the given period.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Returns the tick period.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns how long to sleep after a tick that took `elapsed`.
    ///
    /// Zero when the tick used up the whole interval.
    #[must_use]
    pub const fn delay_after(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }
}

/// Runs `tick` every period until `shutdown` becomes `true` or its sender
/// is dropped. Returns the number of ticks run.
pub async fn run_every<F, Fut>(
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticks = 0_u64;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let started = Instant::now();
        tick().await;
        ticks += 1;

        let elapsed = started.elapsed();
        let delay = schedule.delay_after(elapsed);
        if delay.is_zero() {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = schedule.interval().as_millis() as u64,
                "tick overran interval"
            );
            continue;
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    ticks
}

/// Handle to a spawned background loop.
#[derive(Debug)]
pub struct LoopHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    /// Spawns a loop body that receives its own stop signal.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(body(rx));
        info!(task = name, "background loop started");
        Self {
            name,
            shutdown,
            task,
        }
    }

    /// Returns the loop name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the loop to stop after its current tick and waits for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(task = self.name, error = %e, "background loop panicked");
        } else {
            info!(task = self.name, "background loop stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    mod schedule_tests {
        use super::*;

        #[test]
        fn delay_is_remaining_fraction() {
            let schedule = Schedule::new(Duration::from_millis(100));
            assert_eq!(
                schedule.delay_after(Duration::from_millis(30)),
                Duration::from_millis(70)
            );
        }

        #[test]
        fn overrun_has_no_delay() {
            let schedule = Schedule::new(Duration::from_millis(100));
            assert_eq!(schedule.delay_after(Duration::from_millis(250)), Duration::ZERO);
        }
    }

    mod run_every_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn ticks_at_fixed_period() {
            let (tx, rx) = watch::channel(false);
            let count = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&count);

            let task = tokio::spawn(async move {
                run_every(Schedule::new(Duration::from_secs(1)), rx, || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .await
            });

            tokio::time::sleep(Duration::from_millis(3500)).await;
            tx.send(true).unwrap();
            let ticks = task.await.unwrap();

            // Ticks at t=0, 1, 2, 3
            assert_eq!(ticks, 4);
            assert_eq!(count.load(Ordering::SeqCst), 4);
        }

        #[tokio::test(start_paused = true)]
        async fn slow_tick_does_not_accumulate_lag() {
            let (tx, rx) = watch::channel(false);
            let started = Instant::now();

            let task = tokio::spawn(async move {
                run_every(Schedule::new(Duration::from_secs(1)), rx, || async {
                    tokio::time::sleep(Duration::from_millis(600)).await;
                })
                .await
            });

            // Each tick takes 600ms and sleeps 400ms: one tick per second.
            tokio::time::sleep(Duration::from_millis(4500)).await;
            tx.send(true).unwrap();
            let ticks = task.await.unwrap();

            assert_eq!(ticks, 5);
            assert!(started.elapsed() >= Duration::from_millis(4500));
        }

        #[tokio::test(start_paused = true)]
        async fn stops_when_sender_dropped() {
            let (tx, rx) = watch::channel(false);
            let task = tokio::spawn(async move {
                run_every(Schedule::new(Duration::from_secs(60)), rx, || async {}).await
            });

            tokio::task::yield_now().await;
            drop(tx);
            let ticks = task.await.unwrap();
            assert_eq!(ticks, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn already_stopped_runs_nothing() {
            let (_tx, rx) = watch::channel(true);
            let ticks = run_every(Schedule::new(Duration::from_secs(1)), rx, || async {}).await;
            assert_eq!(ticks, 0);
        }
    }

    mod loop_handle_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn stop_waits_for_loop() {
            let count = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&count);

            let handle = LoopHandle::spawn("test", move |rx| async move {
                run_every(Schedule::new(Duration::from_secs(1)), rx, || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .await;
            });

            assert_eq!(handle.name(), "test");
            tokio::time::sleep(Duration::from_millis(1500)).await;
            handle.stop().await;

            assert_eq!(count.load(Ordering::SeqCst), 2);
        }
    }
}
