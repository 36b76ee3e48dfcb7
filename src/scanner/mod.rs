//! Scanner module containing the batch scheduler

pub mod engine;

use crate::network::ProbeOutcome;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

pub use engine::ScanEngine;

/// A group of addresses probed together and awaited as a whole
#[derive(Debug, Clone)]
pub struct ScanBatch {
    pub addresses: Vec<IpAddr>,
    pub batch_id: usize,
}

impl ScanBatch {
    pub fn new(addresses: Vec<IpAddr>, batch_id: usize) -> Self {
        Self { addresses, batch_id }
    }

    pub fn size(&self) -> usize {
        self.addresses.len()
    }
}

/// Every outcome of one finished batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_id: usize,
    pub outcomes: Vec<ProbeOutcome>,
    pub duration: Duration,
}

impl BatchResult {
    /// Addresses that answered, in the order the batch collected them
    pub fn reachable(&self) -> Vec<IpAddr> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_reachable())
            .map(|outcome| outcome.address)
            .collect()
    }
}

/// Split the target set into consecutive batches of at most `batch_size`
pub fn create_batches(targets: &[IpAddr], batch_size: usize) -> Vec<ScanBatch> {
    targets
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(id, chunk)| ScanBatch::new(chunk.to_vec(), id))
        .collect()
}

/// What one scan request amounted to
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Addresses in the expanded target set
    pub targets: usize,

    /// Addresses that accepted a connection
    pub reachable: usize,

    /// Batches run
    pub batches: usize,

    /// Result messages sent, excluding the acknowledgement
    pub chunks: usize,

    /// Wall time of the probing phase
    pub duration: Duration,
}

impl ScanSummary {
    /// Get scan rate in addresses per second
    pub fn scan_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.targets as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} hosts up, {} batches, {} chunks in {:.2}s ({:.0} addr/s)",
            self.reachable,
            self.targets,
            self.batches,
            self.chunks,
            self.duration.as_secs_f64(),
            self.scan_rate()
        )
    }
}
