//! Per-host politeness gate (C5, §4.5): tracks last-request time per host
//! and computes how long a caller must wait before issuing the next request.

use dashmap::DashMap;
use std::time::{Duration, Instant};

const MAX_TRACKED_HOSTS: usize = 1_000;
const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

pub struct PolitenessGate {
    last_request_at: DashMap<String, Instant>,
}

impl PolitenessGate {
    pub fn new() -> Self {
        Self {
            last_request_at: DashMap::new(),
        }
    }

    /// Returns how long the caller should sleep before requesting `host_key`
    /// again, given `delay`. Does not itself update the tracked time — call
    /// `record_request` once the request actually starts.
    pub fn wait_duration(&self, host_key: &str, delay: Duration) -> Duration {
        match self.last_request_at.get(host_key) {
            Some(last) => {
                let elapsed = last.elapsed();
                delay.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    pub fn record_request(&self, host_key: &str) {
        self.prune_if_needed();
        self.last_request_at.insert(host_key.to_string(), Instant::now());
    }

    fn prune_if_needed(&self) {
        if self.last_request_at.len() < MAX_TRACKED_HOSTS {
            return;
        }
        self.last_request_at
            .retain(|_, last| last.elapsed() < STALE_AFTER);
    }
}

impl Default for PolitenessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_needs_no_wait() {
        let gate = PolitenessGate::new();
        assert_eq!(gate.wait_duration("example.com", Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn immediately_repeated_request_waits_close_to_full_delay() {
        let gate = PolitenessGate::new();
        gate.record_request("example.com");
        let wait = gate.wait_duration("example.com", Duration::from_millis(200));
        assert!(wait > Duration::from_millis(150));
        assert!(wait <= Duration::from_millis(200));
    }

    #[test]
    fn distinct_hosts_are_independent() {
        let gate = PolitenessGate::new();
        gate.record_request("a.example.com");
        assert_eq!(
            gate.wait_duration("b.example.com", Duration::from_secs(5)),
            Duration::ZERO
        );
    }
}
