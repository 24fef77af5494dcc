//! ⏱️ Throttler -- the bouncer with a stopwatch.
//!
//! "You just went in. Wait your turn." The throttler remembers when the last propagation was
//! let through and makes the next one wait until `min_interval` has passed. The first one walks
//! right in. Nobody else does.
//!
//! 🧠 Knowledge graph:
//! - Owned by exactly one `Accumulator`, which is owned by exactly one file worker.
//! - `throttle(&mut self)`: exclusive access is the borrow checker's job, so there is no lock.
//! - Time comes from `tokio::time`, so tests can pause the clock and still measure real gaps.
//! - Interruption goes through [`InterruptSignal`], a `watch` flag. An interrupted wait is an
//!   error, never an early `Ok`, because an early `Ok` is a broken rate limit wearing a disguise.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::error::EngineError;

/// 🚨 The "stop everything" button. Cloneable, so every worker can hold one.
#[derive(Debug, Clone)]
pub struct Interrupter {
    tx: watch::Sender<bool>,
}

impl Interrupter {
    /// 🚨 Flip the flag. Every throttler watching it stops waiting and errors out.
    pub fn interrupt(&self) {
        // -- send_replace never fails, even with zero receivers. exactly what a panic button wants.
        self.tx.send_replace(true);
    }
}

/// 👂 The receiving half of an [`Interrupter`].
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    rx: watch::Receiver<bool>,
}

impl InterruptSignal {
    /// 🔌 A connected button/ear pair.
    pub fn channel() -> (Interrupter, InterruptSignal) {
        let (tx, rx) = watch::channel(false);
        (Interrupter { tx }, InterruptSignal { rx })
    }

    /// 🚨 Has the button been pressed already?
    pub fn is_interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// 👂 Resolves once the flag flips. If the interrupter is gone, it never resolves:
    /// nobody is left who could press the button.
    async fn interrupted(&mut self) {
        if self.rx.wait_for(|flag| *flag).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// ⏱️ Enforces a minimum gap between successive calls to [`Throttler::throttle`].
#[derive(Debug)]
pub struct Throttler {
    min_interval: Duration,
    last: Option<Instant>,
    interrupt: Option<InterruptSignal>,
}

impl Throttler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
            interrupt: None,
        }
    }

    pub fn from_millis(min_interval_millis: u64) -> Self {
        Self::new(Duration::from_millis(min_interval_millis))
    }

    /// 🚨 Attach an interrupt signal. Without one, waits always run to completion.
    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// ⏱️ Wait until at least `min_interval` has passed since the previous call returned.
    ///
    /// The first call never waits. After returning `Ok`, "now" becomes the reference point for
    /// the next call. If the interrupt signal fires before or during the wait, returns
    /// [`EngineError::ThrottleInterrupted`] and leaves the reference point untouched.
    pub async fn throttle(&mut self) -> Result<(), EngineError> {
        let wait = match self.last {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        };

        if let Some(interrupt) = self.interrupt.as_ref() {
            if interrupt.is_interrupted() {
                return Err(EngineError::ThrottleInterrupted {
                    remaining_millis: wait.as_millis() as u64,
                });
            }
        }

        if !wait.is_zero() {
            trace!("⏱️ throttling for {}ms before the next propagation", wait.as_millis());
            let deadline = Instant::now() + wait;
            match self.interrupt.as_mut() {
                Some(interrupt) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = interrupt.interrupted() => {
                            let remaining = deadline.saturating_duration_since(Instant::now());
                            return Err(EngineError::ThrottleInterrupted {
                                remaining_millis: remaining.as_millis() as u64,
                            });
                        }
                    }
                }
                None => sleep(wait).await,
            }
        }

        self.last = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_first_call_walks_right_in() -> anyhow::Result<()> {
        let mut the_bouncer = Throttler::from_millis(5_000);
        let before = Instant::now();
        the_bouncer.throttle().await?;
        assert_eq!(Instant::now(), before, "first call must not wait, not even a paused tick");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_second_call_waits_out_the_interval() -> anyhow::Result<()> {
        let mut the_bouncer = Throttler::from_millis(250);
        the_bouncer.throttle().await?;
        let first = Instant::now();
        the_bouncer.throttle().await?;
        let second = Instant::now();
        the_bouncer.throttle().await?;
        let third = Instant::now();

        assert!(second - first >= Duration::from_millis(250));
        assert!(third - second >= Duration::from_millis(250));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_slow_callers_do_not_wait_twice() -> anyhow::Result<()> {
        let mut the_bouncer = Throttler::from_millis(100);
        the_bouncer.throttle().await?;
        // -- the caller was busy for longer than the interval, so nobody owes the bouncer anything
        tokio::time::advance(Duration::from_millis(150)).await;
        let before = Instant::now();
        the_bouncer.throttle().await?;
        assert_eq!(Instant::now(), before);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_zero_interval_means_no_bouncer_at_all() -> anyhow::Result<()> {
        let mut the_bouncer = Throttler::from_millis(0);
        let before = Instant::now();
        for _ in 0..5 {
            the_bouncer.throttle().await?;
        }
        assert_eq!(Instant::now(), before);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_an_interrupt_mid_wait_fails_loudly() -> anyhow::Result<()> {
        let (the_button, the_ear) = InterruptSignal::channel();
        let mut the_bouncer = Throttler::from_millis(10_000).with_interrupt(the_ear);
        the_bouncer.throttle().await?;

        let presser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            the_button.interrupt();
        });

        let the_verdict = the_bouncer.throttle().await;
        presser.await?;
        match the_verdict {
            Err(EngineError::ThrottleInterrupted { remaining_millis }) => {
                assert!(remaining_millis > 0, "interrupted early, so time must remain");
            }
            other => panic!("💀 expected ThrottleInterrupted, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_an_already_pressed_button_stops_even_the_first_call() {
        let (the_button, the_ear) = InterruptSignal::channel();
        the_button.interrupt();
        let mut the_bouncer = Throttler::from_millis(10).with_interrupt(the_ear);
        assert!(matches!(
            the_bouncer.throttle().await,
            Err(EngineError::ThrottleInterrupted { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_dropped_button_means_the_wait_completes() -> anyhow::Result<()> {
        let (the_button, the_ear) = InterruptSignal::channel();
        drop(the_button);
        let mut the_bouncer = Throttler::from_millis(50).with_interrupt(the_ear);
        the_bouncer.throttle().await?;
        let before = Instant::now();
        the_bouncer.throttle().await?;
        assert!(Instant::now() - before >= Duration::from_millis(50));
        Ok(())
    }
}
