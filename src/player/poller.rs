use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic trigger for position re-queries while playing.
///
/// Dropping the poller stops it; no tick can be observed afterwards.
#[derive(Debug)]
pub struct PositionPoller {
    interval: Interval,
}

impl PositionPoller {
    /// First tick fires one `period` from now.
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        PositionPoller { interval }
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Resolves on the next tick, or never when there is no poller.
pub async fn next_tick(poller: Option<&mut PositionPoller>) {
    match poller {
        Some(poller) => poller.tick().await,
        None => std::future::pending().await,
    }
}
