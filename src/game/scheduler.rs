//! Tick lifecycle and wall-clock delta measurement

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::info;

/// Shortest tick period the scheduler will arm
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Highest accepted tick rate, matching `MIN_TICK_PERIOD`
pub const MAX_TICK_RATE: f64 = 1000.0;

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Running,
    Paused,
}

/// Result of a lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The request changed the lifecycle
    Applied,
    /// The request was not valid in the current state and was ignored
    Ignored,
}

impl Transition {
    pub fn applied(self) -> bool {
        self == Transition::Applied
    }
}

/// Drives the periodic tick and measures the time between ticks.
///
/// The scheduler only tracks timing; the caller owns the simulation and
/// decides what a tick does.
#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    lifecycle: Lifecycle,
    last_tick: Instant,
    ticker: Option<Interval>,
}

impl TickScheduler {
    /// Create a stopped scheduler firing `rate` times per second
    pub fn new(rate: f64) -> Self {
        Self {
            period: Duration::try_from_secs_f64(1.0 / rate)
                .unwrap_or(MIN_TICK_PERIOD)
                .max(MIN_TICK_PERIOD),
            lifecycle: Lifecycle::Stopped,
            last_tick: Instant::now(),
            ticker: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn is_paused(&self) -> bool {
        self.lifecycle == Lifecycle::Paused
    }

    /// Begin ticking from a clean timing baseline
    pub fn start(&mut self) -> Transition {
        match self.lifecycle {
            Lifecycle::Running => {
                info!("Tick loop already running, ignoring start");
                Transition::Ignored
            }
            Lifecycle::Stopped | Lifecycle::Paused => {
                self.arm();
                self.lifecycle = Lifecycle::Running;
                info!(period_ms = self.period.as_millis() as u64, "Tick loop started");
                Transition::Applied
            }
        }
    }

    /// Cancel ticking. Always succeeds; reports whether anything was active.
    pub fn stop(&mut self) -> Transition {
        self.ticker = None;
        self.last_tick = Instant::now();
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Stopped => {
                info!("Tick loop not running or paused, nothing to stop");
                Transition::Ignored
            }
            _ => {
                info!("Tick loop stopped");
                Transition::Applied
            }
        }
    }

    /// Cancel ticking but keep all timing state
    pub fn pause(&mut self) -> Transition {
        if self.lifecycle != Lifecycle::Running {
            info!(lifecycle = ?self.lifecycle, "Tick loop not running, cannot pause");
            return Transition::Ignored;
        }
        self.ticker = None;
        self.lifecycle = Lifecycle::Paused;
        info!("Tick loop paused");
        Transition::Applied
    }

    /// Restart ticking after a pause without a synthetic catch-up delta
    pub fn resume(&mut self) -> Transition {
        if self.lifecycle != Lifecycle::Paused {
            info!(lifecycle = ?self.lifecycle, "Tick loop not paused, cannot resume");
            return Transition::Ignored;
        }
        self.arm();
        self.lifecycle = Lifecycle::Running;
        info!("Tick loop resumed");
        Transition::Applied
    }

    fn arm(&mut self) {
        let now = Instant::now();
        self.last_tick = now;
        let mut ticker = interval_at(now + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    /// Wait for the next tick. Pends forever while not running.
    pub async fn next_tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Time since the previous tick (or since the last baseline)
    pub fn measure_delta(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn lifecycle_rejects_out_of_order_requests() {
        let mut scheduler = TickScheduler::new(10.0);
        assert_eq!(scheduler.pause(), Transition::Ignored);
        assert_eq!(scheduler.resume(), Transition::Ignored);
        assert_eq!(scheduler.stop(), Transition::Ignored);

        assert_eq!(scheduler.start(), Transition::Applied);
        assert_eq!(scheduler.start(), Transition::Ignored);
        assert_eq!(scheduler.resume(), Transition::Ignored);

        assert_eq!(scheduler.pause(), Transition::Applied);
        assert_eq!(scheduler.pause(), Transition::Ignored);
        assert_eq!(scheduler.resume(), Transition::Applied);

        assert_eq!(scheduler.stop(), Transition::Applied);
        assert_eq!(scheduler.lifecycle(), Lifecycle::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn extreme_rates_fall_back_to_minimum_period() {
        for rate in [1e10, 0.0, f64::NAN] {
            let mut scheduler = TickScheduler::new(rate);
            assert_eq!(scheduler.period(), MIN_TICK_PERIOD);
            assert_eq!(scheduler.start(), Transition::Applied);
            scheduler.next_tick().await;
            assert_eq!(scheduler.measure_delta(), MIN_TICK_PERIOD);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_fire_at_configured_period() {
        let mut scheduler = TickScheduler::new(10.0);
        scheduler.start();

        scheduler.next_tick().await;
        let delta = scheduler.measure_delta();
        assert_eq!(delta, Duration::from_millis(100));

        scheduler.next_tick().await;
        assert_eq!(scheduler.measure_delta(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_rebaselines_delta() {
        let mut scheduler = TickScheduler::new(10.0);
        scheduler.start();
        scheduler.next_tick().await;
        scheduler.measure_delta();

        scheduler.pause();
        tokio::time::advance(Duration::from_secs(30)).await;
        scheduler.resume();

        scheduler.next_tick().await;
        assert!(scheduler.measure_delta() <= scheduler.period());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_never_ticks() {
        let mut scheduler = TickScheduler::new(10.0);
        let waited =
            tokio::time::timeout(Duration::from_secs(5), scheduler.next_tick()).await;
        tokio_test::assert_err!(waited);
    }
}
