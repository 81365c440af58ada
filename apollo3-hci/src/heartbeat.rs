//! Idle-channel heartbeat.
//!
//! A stalled controller is otherwise silent: the host only notices when it
//! next has something to send. The heartbeat turns silence into traffic by
//! issuing a harmless command whenever the channel has been idle for one
//! period. Whether the controller answers is judged by the host stack's own
//! command timeout.

use embassy_time::{Duration, Instant};

/// Single-shot deadline, restarted by every completed transaction.
pub(crate) struct Heartbeat {
    period: Option<Duration>,
    deadline: Option<Instant>,
    armed: bool,
}

impl Heartbeat {
    pub(crate) const fn new(period: Option<Duration>) -> Self {
        Self {
            period,
            deadline: None,
            armed: false,
        }
    }

    /// Start watching. The first deadline is taken from the next [`poll`](Self::poll).
    pub(crate) fn arm(&mut self) {
        self.armed = self.period.is_some();
        self.deadline = None;
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
        self.deadline = None;
    }

    /// Push the deadline one period past `now`.
    pub(crate) fn restart(&mut self, now: Instant) {
        if let (true, Some(period)) = (self.armed, self.period) {
            self.deadline = Some(now + period);
        }
    }

    /// Returns `true` exactly once per expiry and re-arms for the next period.
    pub(crate) fn poll(&mut self, now: Instant) -> bool {
        let Some(period) = self.period.filter(|_| self.armed) else {
            return false;
        };

        match self.deadline {
            None => {
                self.deadline = Some(now + period);
                false
            }
            Some(deadline) if now >= deadline => {
                self.deadline = Some(now + period);
                true
            }
            Some(_) => false,
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(10_000);

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn fires_once_at_deadline() {
        let mut hb = Heartbeat::new(Some(PERIOD));
        hb.arm();
        assert!(!hb.poll(at(0)));
        assert!(!hb.poll(at(9_999)));
        assert!(hb.poll(at(10_000)));
        assert!(!hb.poll(at(10_000)));
        assert_eq!(hb.deadline(), Some(at(20_000)));
    }

    #[test]
    fn traffic_before_deadline_postpones_it() {
        let mut hb = Heartbeat::new(Some(PERIOD));
        hb.arm();
        hb.poll(at(0));
        hb.restart(at(9_999));
        assert!(!hb.poll(at(10_000)));
        assert!(!hb.poll(at(19_998)));
        assert!(hb.poll(at(19_999)));
    }

    #[test]
    fn disabled_or_disarmed_never_fires() {
        let mut off = Heartbeat::new(None);
        off.arm();
        off.poll(at(0));
        assert!(!off.poll(at(1_000_000)));

        let mut hb = Heartbeat::new(Some(PERIOD));
        hb.arm();
        hb.poll(at(0));
        hb.disarm();
        assert!(!hb.poll(at(50_000)));
        hb.restart(at(50_000));
        assert_eq!(hb.deadline(), None);
    }
}
