use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::process::{ExitNotification, ProcessControl};

/// Prefix of every session's bus name.
pub const BUS_NAME_DOMAIN: &str = "org.jukybox.player";

/// Generates a bus name no other backend invocation will ever use.
pub fn new_bus_name() -> String {
    format!("{}.p{}", BUS_NAME_DOMAIN, Uuid::new_v4().simple())
}

/// Last confirmed position and when it was confirmed.
///
/// Between samples the position is extrapolated linearly, so a redraw never
/// has to wait on a bus round trip.
#[derive(Debug, Clone, Copy)]
pub struct PositionClock {
    position: Duration,
    observed_at: Instant,
}

impl PositionClock {
    pub fn new(position: Duration) -> Self {
        PositionClock {
            position,
            observed_at: Instant::now(),
        }
    }

    /// Record a confirmed sample.
    pub fn observe(&mut self, position: Duration) {
        self.position = position;
        self.observed_at = Instant::now();
    }

    /// The last confirmed sample.
    pub fn position(&self) -> Duration {
        self.position
    }

    /// Current estimate; only advances while `running`.
    pub fn estimate(&self, running: bool) -> Duration {
        if running {
            self.position + self.observed_at.elapsed()
        } else {
            self.position
        }
    }

    /// Turn the running estimate into a sample, e.g. when playback halts.
    pub fn freeze(&mut self) {
        let position = self.estimate(true);
        self.observe(position);
    }
}

/// Bookkeeping for one live backend process.
#[derive(Debug)]
pub struct Session {
    pub process: Box<dyn ProcessControl>,
    pub exit: ExitNotification,
    pub file: String,
    pub bus_name: String,
    pub clock: PositionClock,
}

impl Session {
    pub fn new(process: Box<dyn ProcessControl>, exit: ExitNotification, file: String, bus_name: String, position: Duration) -> Self {
        Session {
            process,
            exit,
            file,
            bus_name,
            clock: PositionClock::new(position),
        }
    }
}

/// Converts a backend position in microseconds; negative values clamp to zero.
pub fn from_micros(micros: i64) -> Duration {
    Duration::from_micros(u64::try_from(micros).unwrap_or(0))
}

pub fn to_micros(position: Duration) -> i64 {
    i64::try_from(position.as_micros()).unwrap_or(i64::MAX)
}
