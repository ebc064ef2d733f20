// Command watchdog
// Note: if the command source goes silent (teleop crashed, planner hung) while
// the link itself stays up, the watchdog is what brings the robot to a stop.

use tracing::{info, warn};

use crate::clock::Millis;

/// Tracks how recently a velocity command arrived
#[derive(Debug, Clone)]
pub struct CommandWatchdog {
    timeout_ms: u32,
    last_command: Millis,
    reported_stale: bool,
}

impl CommandWatchdog {
    /// `now` counts as the last command, so a fresh watchdog is not stale
    pub fn new(timeout_ms: u32, now: Millis) -> Self {
        Self {
            timeout_ms,
            last_command: now,
            reported_stale: false,
        }
    }

    /// Record that a command was received at `now`
    pub fn notify_command_received(&mut self, now: Millis) {
        if self.reported_stale {
            info!("Commands resumed");
            self.reported_stale = false;
        }
        self.last_command = now;
    }

    /// Restart the window at `now` without logging a resume (new link session)
    pub fn reset(&mut self, now: Millis) {
        self.last_command = now;
        self.reported_stale = false;
    }

    /// True once strictly more than the timeout has elapsed since the last command
    pub fn is_stale(&self, now: Millis) -> bool {
        now.since(self.last_command) > self.timeout_ms
    }

    /// Same as `is_stale`, logging the first check that finds it stale
    pub fn check(&mut self, now: Millis) -> bool {
        let stale = self.is_stale(now);
        if stale && !self.reported_stale {
            warn!(
                "Command stale ({}ms old), stopping robot",
                now.since(self.last_command)
            );
            self.reported_stale = true;
        }
        stale
    }

    pub fn last_command(&self) -> Millis {
        self.last_command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_immediately_after_command() {
        let mut watchdog = CommandWatchdog::new(500, Millis(0));
        watchdog.notify_command_received(Millis(1234));
        assert!(!watchdog.is_stale(Millis(1234)));
    }

    #[test]
    fn test_stale_only_after_exceeding_timeout() {
        let mut watchdog = CommandWatchdog::new(500, Millis(0));
        watchdog.notify_command_received(Millis(1000));
        for t in 1000..=1500 {
            assert!(!watchdog.is_stale(Millis(t)), "stale too early at {}", t);
        }
        assert!(watchdog.is_stale(Millis(1501)));
    }

    #[test]
    fn test_clock_rollover_is_not_stale() {
        let mut watchdog = CommandWatchdog::new(500, Millis(0));
        watchdog.notify_command_received(Millis(u32::MAX - 100));
        assert!(!watchdog.is_stale(Millis(200)));
        assert!(watchdog.is_stale(Millis(400)));
    }

    #[test]
    fn test_check_reports_and_recovers() {
        let mut watchdog = CommandWatchdog::new(500, Millis(0));
        assert!(!watchdog.check(Millis(500)));
        assert!(watchdog.check(Millis(501)));
        assert!(watchdog.check(Millis(900)));
        watchdog.notify_command_received(Millis(950));
        assert!(!watchdog.check(Millis(960)));
    }
}
