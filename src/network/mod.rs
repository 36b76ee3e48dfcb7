//! Network module: probe outcomes and the TCP connect prober

pub mod socket;

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Result of a single connect attempt. Refused, timed out and unroutable
/// all collapse into `Unreachable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable)
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Reachable => write!(f, "reachable"),
            Reachability::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// One probed address and what came back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub address: IpAddr,
    pub reachability: Reachability,
    pub response_time: Duration,
}

impl ProbeOutcome {
    pub fn new(address: IpAddr, reachability: Reachability, response_time: Duration) -> Self {
        Self {
            address,
            reachability,
            response_time,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachability.is_reachable()
    }
}
