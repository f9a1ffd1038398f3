use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Fixed-interval dispatch throttle.
///
/// The first tick is immediate. A late caller gets at most one pending tick,
/// after which ticks are spaced by the full period again.
pub struct RateLimiter {
    ticker: Interval,
    period: Duration,
}

impl RateLimiter {
    pub fn per_second(rate: u32) -> Self {
        Self::with_period(Duration::from_secs(1) / rate.max(1))
    }

    pub fn with_period(period: Duration) -> Self {
        // tokio panics on a zero period
        let period = period.max(Duration::from_micros(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker, period }
    }

    pub async fn wait(&mut self) {
        self.ticker.tick().await;
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
