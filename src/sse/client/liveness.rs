use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::SessionConfig;

/// Result of a heartbeat check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// data arrived within the heartbeat interval
    Healthy,
    /// silent longer than the heartbeat interval
    Degraded {
        /// time since the last received data
        silence: Duration,
    },
    /// silent longer than the message timeout
    Expired {
        /// time since the last received data
        silence: Duration,
    },
}

/// Watchdog for an open stream.
///
/// Holds the message deadline, pushed back by every received chunk, and the periodic
/// heartbeat check. Lives only while the stream is connected.
#[derive(Debug)]
pub struct LivenessMonitor {
    heartbeat_interval: Duration,
    message_timeout: Duration,
    last_activity: Instant,
    heartbeat: Interval,
}

impl LivenessMonitor {
    /// Start watching a stream that opened at `now`.
    pub fn start(config: &SessionConfig, now: Instant) -> Self {
        let period = config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(now + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            heartbeat_interval: period,
            message_timeout: config.message_timeout,
            last_activity: now,
            heartbeat,
        }
    }

    /// Time of the last received chunk, or of the open if none came yet.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Reset the message timeout.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// When the message timeout fires if no data arrives before.
    pub fn message_deadline(&self) -> Instant {
        self.last_activity + self.message_timeout
    }

    /// Classify the silence at `now`.
    pub fn check(&self, now: Instant) -> Liveness {
        let silence = now.saturating_duration_since(self.last_activity);

        if silence > self.message_timeout {
            Liveness::Expired { silence }
        } else if silence > self.heartbeat_interval {
            Liveness::Degraded { silence }
        } else {
            Liveness::Healthy
        }
    }

    /// Wait for the next heartbeat tick and check.
    pub async fn heartbeat(&mut self) -> Liveness {
        let tick = self.heartbeat.tick().await;
        log::trace!("Heartbeat tick");
        self.check(tick.max(Instant::now()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig::new("http://x")
            .heartbeat_interval(Duration::from_secs(30))
            .message_timeout(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_check() {
        let now = Instant::now();
        let monitor = LivenessMonitor::start(&config(), now);

        assert_eq!(monitor.check(now + Duration::from_secs(10)), Liveness::Healthy);
        assert_eq!(
            monitor.check(now + Duration::from_secs(31)),
            Liveness::Degraded {
                silence: Duration::from_secs(31)
            }
        );
        assert_eq!(
            monitor.check(now + Duration::from_secs(61)),
            Liveness::Expired {
                silence: Duration::from_secs(61)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_pushes_deadline() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::start(&config(), start);
        assert_eq!(monitor.message_deadline(), start + Duration::from_secs(60));

        let later = start + Duration::from_secs(45);
        monitor.record_activity(later);
        assert_eq!(monitor.last_activity(), later);
        assert_eq!(monitor.message_deadline(), later + Duration::from_secs(60));
        assert_eq!(monitor.check(later + Duration::from_secs(1)), Liveness::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_ticks_every_interval() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::start(&config(), start);

        assert!(matches!(monitor.heartbeat().await, Liveness::Healthy));
        assert_eq!(Instant::now(), start + Duration::from_secs(30));

        assert!(matches!(
            monitor.heartbeat().await,
            Liveness::Degraded { .. }
        ));
        assert!(matches!(
            monitor.heartbeat().await,
            Liveness::Expired { .. }
        ));
    }
}
