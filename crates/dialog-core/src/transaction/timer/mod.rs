//! Transaction timers.
//!
//! RFC 3261 §17 drives every transaction with a small set of named timers:
//!
//! ## Client Transaction Timers
//! - **Timer A** (INVITE): request retransmission, starts at T1 and doubles
//! - **Timer B** (INVITE): transaction timeout, 64*T1
//! - **Timer D** (INVITE): wait for response retransmissions, 32s
//! - **Timer E** (non-INVITE): request retransmission, doubles up to T2
//! - **Timer F** (non-INVITE): transaction timeout, 64*T1
//! - **Timer K** (non-INVITE): wait for response retransmissions, T4
//!
//! ## Server Transaction Timers
//! - **Timer G** (INVITE): response retransmission, doubles up to T2
//! - **Timer H** (INVITE): wait for ACK, 64*T1
//! - **Timer I** (INVITE): wait in Confirmed, T4
//! - **Timer J** (non-INVITE): wait for request retransmissions, 64*T1
//!
//! Two more timers are not named by the RFC: the 100-Trying grace timer of the
//! INVITE server transaction and the cleanup timer that evicts a terminated
//! transaction from the table.
//!
//! Timers are scheduled on a shared [`TimerWheel`] and fire into the owning
//! transaction's lock, so a firing timer and an arriving message are serialized.

mod wheel;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use wheel::{TimerId, TimerWheel};

/// A transaction timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerType {
    A,
    B,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    /// Sends 100 Trying if the TU has not answered an INVITE in time
    Trying,
    /// Evicts a terminated transaction from the table
    Cleanup,
}

impl TimerType {
    /// Whether expiry of this timer is a transaction failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimerType::B | TimerType::F | TimerType::H)
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerType::A => write!(f, "A"),
            TimerType::B => write!(f, "B"),
            TimerType::D => write!(f, "D"),
            TimerType::E => write!(f, "E"),
            TimerType::F => write!(f, "F"),
            TimerType::G => write!(f, "G"),
            TimerType::H => write!(f, "H"),
            TimerType::I => write!(f, "I"),
            TimerType::J => write!(f, "J"),
            TimerType::K => write!(f, "K"),
            TimerType::Trying => write!(f, "Trying"),
            TimerType::Cleanup => write!(f, "Cleanup"),
        }
    }
}

/// Base timer values, in milliseconds so they read naturally from TOML and
/// environment variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// RTT estimate (T1)
    pub t1_ms: u64,
    /// Maximum retransmit interval for non-INVITE requests and INVITE responses (T2)
    pub t2_ms: u64,
    /// Maximum duration a message will remain in the network (T4)
    pub t4_ms: u64,
    /// Timer D, wait time for response retransmits on unreliable transports
    pub timer_d_ms: u64,
    /// Upper bound on the Timer A interval; `None` lets it double until Timer B
    pub invite_retransmit_cap_ms: Option<u64>,
    /// Delay before an INVITE server transaction sends 100 Trying on its own
    pub trying_grace_ms: u64,
    /// How long a terminated transaction stays in the table
    pub cleanup_delay_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1_ms: 500,
            t2_ms: 4_000,
            t4_ms: 5_000,
            timer_d_ms: 32_000,
            invite_retransmit_cap_ms: None,
            trying_grace_ms: 200,
            cleanup_delay_ms: 32_000,
        }
    }
}

impl TimerSettings {
    /// T1
    pub fn t1(&self) -> Duration {
        Duration::from_millis(self.t1_ms)
    }

    /// T2
    pub fn t2(&self) -> Duration {
        Duration::from_millis(self.t2_ms)
    }

    /// T4
    pub fn t4(&self) -> Duration {
        Duration::from_millis(self.t4_ms)
    }

    /// 64*T1, shared by Timers B, F, H and J
    pub fn transaction_timeout(&self) -> Duration {
        self.t1() * 64
    }

    /// Initial duration of `timer`; retransmission timers start at T1
    pub fn initial(&self, timer: TimerType) -> Duration {
        match timer {
            TimerType::A | TimerType::E | TimerType::G => self.t1(),
            TimerType::B | TimerType::F | TimerType::H | TimerType::J => self.transaction_timeout(),
            TimerType::D => Duration::from_millis(self.timer_d_ms),
            TimerType::I | TimerType::K => self.t4(),
            TimerType::Trying => Duration::from_millis(self.trying_grace_ms),
            TimerType::Cleanup => Duration::from_millis(self.cleanup_delay_ms),
        }
    }

    /// Interval following `current` for a retransmission timer.
    ///
    /// A doubles, bounded only by `invite_retransmit_cap_ms`; E and G double up to T2.
    pub fn next_interval(&self, timer: TimerType, current: Duration) -> Duration {
        let doubled = current.saturating_mul(2);
        match timer {
            TimerType::A => match self.invite_retransmit_cap_ms {
                Some(cap) => doubled.min(Duration::from_millis(cap)),
                None => doubled,
            },
            TimerType::E | TimerType::G => doubled.min(self.t2()),
            _ => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_rfc() {
        let settings = TimerSettings::default();
        assert_eq!(settings.t1(), Duration::from_millis(500));
        assert_eq!(settings.initial(TimerType::B), Duration::from_secs(32));
        assert_eq!(settings.initial(TimerType::D), Duration::from_secs(32));
        assert_eq!(settings.initial(TimerType::K), Duration::from_secs(5));
        assert_eq!(TimerType::A.to_string(), "A");
    }

    #[test]
    fn test_backoff() {
        let settings = TimerSettings::default();
        let mut interval = settings.initial(TimerType::E);
        let mut seen = Vec::new();
        for _ in 0..5 {
            interval = settings.next_interval(TimerType::E, interval);
            seen.push(interval.as_millis());
        }
        assert_eq!(seen, vec![1000, 2000, 4000, 4000, 4000]);

        assert_eq!(
            settings.next_interval(TimerType::A, Duration::from_secs(8)),
            Duration::from_secs(16)
        );
        let capped = TimerSettings {
            invite_retransmit_cap_ms: Some(2_000),
            ..TimerSettings::default()
        };
        assert_eq!(
            capped.next_interval(TimerType::A, Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
