//! Session timer
//!
//! Elapsed time is derived from a monotonic clock, not accumulated from
//! ticks, so delayed or throttled ticks never cause drift. The timer records
//! when it started; every `tick()` recomputes `elapsed = now - start`,
//! clamped to the session duration. Completion is reported exactly once.
//!
//! The ticker task only decides *when* to look at the clock. It can be
//! late, skip, or stall without affecting what `tick()` reports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Real monotonic time. Uses tokio's clock, so paused-time tests control it.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for deterministic tests and simulations
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().expect("manual clock mutex poisoned") += by;
    }

    pub fn set(&self, to: Duration) {
        *self.now.lock().expect("manual clock mutex poisoned") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().expect("manual clock mutex poisoned")
    }
}

/// What one `tick()` observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub elapsed: Duration,
    /// None for open-ended sessions
    pub remaining: Option<Duration>,
    /// True on the single tick that crossed the end
    pub completed: bool,
}

/// Countdown (or open-ended count-up) for one session
pub struct SessionTimer {
    clock: Arc<dyn Clock>,

    /// None = open-ended, never completes
    duration: Option<Duration>,

    /// Clock reading when the current run started (None if paused/stopped)
    start_epoch: Option<Duration>,

    /// Elapsed time banked by earlier runs before a pause
    banked: Duration,

    started: bool,
    completed: bool,
    ticker: Option<JoinHandle<()>>,
}

impl SessionTimer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            duration: None,
            start_epoch: None,
            banked: Duration::ZERO,
            started: false,
            completed: false,
            ticker: None,
        }
    }

    /// Start counting from zero. Restarting discards any previous run.
    pub fn start(&mut self, duration: Option<Duration>) {
        self.abort_ticker();
        self.duration = duration;
        self.start_epoch = Some(self.clock.now());
        self.banked = Duration::ZERO;
        self.started = true;
        self.completed = false;
        debug!(?duration, "session timer started");
    }

    /// Elapsed session time, clamped to the duration
    pub fn elapsed(&self) -> Duration {
        let running = self
            .start_epoch
            .map(|epoch| self.clock.now().saturating_sub(epoch))
            .unwrap_or_default();
        let total = self.banked + running;
        match self.duration {
            Some(d) => total.min(d),
            None => total,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.duration.map(|d| d.saturating_sub(self.elapsed()))
    }

    /// Sample the clock. `completed` is true exactly once per run.
    pub fn tick(&mut self) -> TimerTick {
        let elapsed = self.elapsed();
        let reached_end = self.started && self.duration.is_some_and(|d| elapsed >= d);

        let completed = reached_end && !self.completed;
        if completed {
            self.completed = true;
            self.abort_ticker();
            info!(elapsed_secs = elapsed.as_secs_f64(), "session timer completed");
        }

        TimerTick {
            elapsed,
            remaining: self.remaining(),
            completed,
        }
    }

    /// Freeze elapsed time until `resume`
    pub fn pause(&mut self) {
        if let Some(epoch) = self.start_epoch.take() {
            self.banked += self.clock.now().saturating_sub(epoch);
        }
    }

    /// Continue after `pause`; the end moves out by however long we were paused
    pub fn resume(&mut self) {
        if self.started && !self.completed && self.start_epoch.is_none() {
            self.start_epoch = Some(self.clock.now());
        }
    }

    /// Stop and reset. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.abort_ticker();
        self.start_epoch = None;
        self.banked = Duration::ZERO;
        self.started = false;
        self.completed = false;
    }

    pub fn is_running(&self) -> bool {
        self.started && !self.completed && self.start_epoch.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.started && !self.completed && self.start_epoch.is_none()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Call `on_tick` every `interval` until it returns false or the timer
    /// stops. Replaces any ticker already running.
    pub fn spawn_ticker<F>(&mut self, interval: Duration, on_tick: F)
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.abort_ticker();
        self.ticker = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately
            ticks.tick().await;
            loop {
                ticks.tick().await;
                if !on_tick() {
                    break;
                }
            }
        }));
    }

    pub fn has_ticker(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn abort_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.abort_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manual() -> (ManualClock, SessionTimer) {
        let clock = ManualClock::new();
        let timer = SessionTimer::new(Arc::new(clock.clone()));
        (clock, timer)
    }

    #[test]
    fn test_new_timer_is_idle() {
        let (_, mut timer) = manual();
        assert!(!timer.is_running());
        let tick = timer.tick();
        assert_eq!(tick.elapsed, Duration::ZERO);
        assert!(!tick.completed);
    }

    #[test]
    fn test_elapsed_is_clamped_and_completes_once() {
        let (clock, mut timer) = manual();
        timer.start(Some(Duration::from_secs(60)));

        clock.advance(Duration::from_secs(30));
        let tick = timer.tick();
        assert_eq!(tick.elapsed, Duration::from_secs(30));
        assert_eq!(tick.remaining, Some(Duration::from_secs(30)));
        assert!(!tick.completed);

        // a throttled ticker that wakes up late still sees the true time
        clock.advance(Duration::from_secs(45));
        let tick = timer.tick();
        assert_eq!(tick.elapsed, Duration::from_secs(60));
        assert!(tick.completed);

        clock.advance(Duration::from_secs(5));
        assert!(!timer.tick().completed);
        assert!(!timer.is_running());
    }

    #[test]
    fn test_open_ended_never_completes() {
        let (clock, mut timer) = manual();
        timer.start(None);
        clock.advance(Duration::from_secs(3600 * 5));
        let tick = timer.tick();
        assert_eq!(tick.elapsed, Duration::from_secs(3600 * 5));
        assert!(tick.remaining.is_none());
        assert!(!tick.completed);
    }

    #[test]
    fn test_pause_freezes_and_resume_extends() {
        let (clock, mut timer) = manual();
        timer.start(Some(Duration::from_secs(60)));
        clock.advance(Duration::from_secs(20));

        timer.pause();
        assert!(timer.is_paused());
        clock.advance(Duration::from_secs(100));
        assert_eq!(timer.elapsed(), Duration::from_secs(20));

        timer.resume();
        clock.advance(Duration::from_secs(39));
        assert!(!timer.tick().completed);
        clock.advance(Duration::from_secs(1));
        assert!(timer.tick().completed);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (clock, mut timer) = manual();
        timer.start(Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(4));

        timer.stop();
        timer.stop();
        assert!(!timer.is_running());
        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert!(!timer.tick().completed);
    }

    #[test]
    fn test_restart_resets_completion() {
        let (clock, mut timer) = manual();
        timer.start(Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(1));
        assert!(timer.tick().completed);

        timer.start(Some(Duration::from_secs(1)));
        assert_eq!(timer.elapsed(), Duration::ZERO);
        clock.advance(Duration::from_secs(2));
        assert!(timer.tick().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_tokio_time() {
        let mut timer = SessionTimer::new(Arc::new(MonotonicClock::new()));
        timer.start(Some(Duration::from_secs(60)));
        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(timer.tick().elapsed, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_until_stopped() {
        let (_, mut timer) = manual();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        timer.start(None);
        timer.spawn_ticker(Duration::from_millis(250), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        });
        assert!(timer.has_ticker());

        tokio::time::sleep(Duration::from_millis(1010)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        timer.stop();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(!timer.has_ticker());
    }
}
