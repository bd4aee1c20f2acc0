//! Heartbeat timing: when to ping the broker and when to give up on it.
//!
//! # How the two thresholds relate (for beginners)
//!
//! With heartbeat interval `H`:
//!
//! - **Timeout** – if nothing at all has arrived for more than `1.5 × H`,
//!   the connection is considered dead.
//! - **Ping** – if we have been quiet (no send) or the broker has been quiet
//!   (no receive) for more than `H`, send a ping.  Pings are rate-limited to
//!   one per `H / 10`.
//!
//! A healthy broker answers a ping long before the timeout fires, so the
//! timeout only triggers on a link that is silently broken.
//!
//! Everything here is a pure function of the [`Timers`] and the current time.

/// Millisecond timestamps the engine records as traffic flows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    /// Last time a valid header was received.
    pub last_recv: u64,
    /// Last time a frame was written successfully.
    pub last_send: u64,
    /// Last time a ping was written successfully.
    pub last_ping: u64,
}

impl Timers {
    /// Timers for a fresh connection attempt started at `now`.
    ///
    /// `last_recv` starts at `now` so the timeout clock runs from the moment
    /// the login is sent.
    pub fn starting_at(now: u64) -> Self {
        Self {
            last_recv: now,
            last_send: 0,
            last_ping: 0,
        }
    }
}

/// Heartbeat decisions for a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    interval_ms: u64,
}

impl HeartbeatPolicy {
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms }
    }

    pub fn from_secs(secs: u32) -> Self {
        Self::new(u64::from(secs) * 1000)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Silence longer than this is fatal.
    pub fn timeout_ms(&self) -> u64 {
        self.interval_ms + self.interval_ms / 2
    }

    /// Returns `true` once nothing has been received for longer than
    /// [`timeout_ms`](Self::timeout_ms).
    pub fn is_timed_out(&self, timers: &Timers, now: u64) -> bool {
        now.saturating_sub(timers.last_recv) > self.timeout_ms()
    }

    /// Returns `true` when a connected engine should send a ping now.
    pub fn should_ping(&self, timers: &Timers, now: u64) -> bool {
        let since = |t: u64| now.saturating_sub(t);
        since(timers.last_ping) > self.interval_ms / 10
            && (since(timers.last_send) > self.interval_ms
                || since(timers.last_recv) > self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: u64 = 10_000;

    #[test]
    fn test_timeout_fires_only_after_one_and_a_half_intervals() {
        // Arrange
        let policy = HeartbeatPolicy::new(H);
        let timers = Timers::starting_at(1_000);

        // Act / Assert
        assert!(!policy.is_timed_out(&timers, 1_000 + 15_000));
        assert!(policy.is_timed_out(&timers, 1_000 + 15_001));
    }

    #[test]
    fn test_no_ping_while_traffic_is_recent() {
        let policy = HeartbeatPolicy::new(H);
        let timers = Timers {
            last_recv: 50_000,
            last_send: 50_000,
            last_ping: 0,
        };

        assert!(!policy.should_ping(&timers, 55_000));
    }

    #[test]
    fn test_ping_when_send_side_is_idle() {
        // Arrange – we received recently but have not sent for > H
        let policy = HeartbeatPolicy::new(H);
        let timers = Timers {
            last_recv: 59_000,
            last_send: 49_000,
            last_ping: 0,
        };

        // Act
        let ping = policy.should_ping(&timers, 60_000);

        // Assert
        assert!(ping);
    }

    #[test]
    fn test_ping_when_receive_side_is_idle() {
        let policy = HeartbeatPolicy::new(H);
        let timers = Timers {
            last_recv: 49_000,
            last_send: 59_000,
            last_ping: 0,
        };

        assert!(policy.should_ping(&timers, 60_000));
    }

    #[test]
    fn test_ping_rate_limited_to_tenth_of_interval() {
        // Arrange – both sides idle, but a ping went out 500 ms ago
        let policy = HeartbeatPolicy::new(H);
        let timers = Timers {
            last_recv: 0,
            last_send: 0,
            last_ping: 59_500,
        };

        // Act / Assert
        assert!(!policy.should_ping(&timers, 60_000));
        assert!(policy.should_ping(&timers, 60_501));
    }

    #[test]
    fn test_from_secs_converts_to_millis() {
        let policy = HeartbeatPolicy::from_secs(10);
        assert_eq!(policy.interval_ms(), 10_000);
        assert_eq!(policy.timeout_ms(), 15_000);
    }

    #[test]
    fn test_clock_behind_timers_does_not_underflow() {
        let policy = HeartbeatPolicy::new(H);
        let timers = Timers::starting_at(5_000);
        assert!(!policy.is_timed_out(&timers, 1_000));
        assert!(!policy.should_ping(&timers, 1_000));
    }
}
