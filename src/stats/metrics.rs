//! Statistics for the CEC service

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters updated by the service thread, readable from anywhere
#[derive(Debug)]
pub struct ServiceStats {
    started_at: Instant,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    messages_unhandled: AtomicU64,
    actions_started: AtomicU64,
    action_timeouts: AtomicU64,
}

/// Point-in-time copy of `ServiceStats`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames handed to the service by the transport
    pub frames_received: u64,
    /// Frames dropped as malformed or invalid
    pub frames_dropped: u64,
    /// Messages sent on the bus
    pub messages_sent: u64,
    /// Sends that were not acknowledged
    pub send_failures: u64,
    /// Directed messages answered with `<Feature Abort>`
    pub messages_unhandled: u64,
    pub actions_started: u64,
    /// Action timer expirations
    pub action_timeouts: u64,
    pub uptime: Duration,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            messages_unhandled: AtomicU64::new(0),
            actions_started: AtomicU64::new(0),
            action_timeouts: AtomicU64::new(0),
        }
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self, acked: bool) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        if !acked {
            self.send_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn message_unhandled(&self) {
        self.messages_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_started(&self) {
        self.actions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_timeout(&self) {
        self.action_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            messages_unhandled: self.messages_unhandled.load(Ordering::Relaxed),
            actions_started: self.actions_started.load(Ordering::Relaxed),
            action_timeouts: self.action_timeouts.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = ServiceStats::new().snapshot();
        assert_eq!(stats.frames_received, 0);
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.actions_started, 0);
    }

    #[test]
    fn test_send_failures_counted() {
        let stats = ServiceStats::new();
        stats.message_sent(true);
        stats.message_sent(false);
        stats.frame_received();
        stats.frame_dropped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.send_failures, 1);
        assert_eq!(snapshot.frames_received, 1);
        assert_eq!(snapshot.frames_dropped, 1);
    }
}
