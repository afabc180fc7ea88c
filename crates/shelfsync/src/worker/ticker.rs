//! Tick sources driving the worker loops.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// A source of loop iterations.
#[async_trait]
pub trait Ticker: Send {
    /// Waits for the next tick. Returns `false` once the source is exhausted.
    async fn tick(&mut self) -> bool;
}

/// Fixed-period ticks. The first tick fires one period after creation and
/// missed ticks are delayed rather than bursted.
///
/// Must be created inside a tokio runtime.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks on demand. Exhausted once every [`ManualTrigger`] is dropped and
/// pending ticks are consumed.
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Clone)]
pub struct ManualTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTrigger { tx })
    }
}

impl ManualTrigger {
    /// Queues one tick. Returns `false` if the ticker is gone.
    pub fn tick(&self) -> bool {
        self.tx.send(()).is_ok()
    }

    pub fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_ticker_drains_then_ends() {
        let (mut ticker, trigger) = ManualTicker::new();
        trigger.tick_n(2);
        drop(trigger);

        assert!(ticker.tick().await);
        assert!(ticker.tick().await);
        assert!(!ticker.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_skips_immediate_tick() {
        let start = Instant::now();
        let mut ticker = IntervalTicker::new(Duration::from_secs(5));

        assert!(ticker.tick().await);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(ticker.tick().await);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
