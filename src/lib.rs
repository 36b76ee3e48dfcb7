//! Portsweep - batched TCP liveness sweeps
//!
//! Expands CIDR ranges and bare addresses, probes one fixed TCP port on every
//! address with bounded concurrency and short timeouts, and streams the live
//! hosts back to the caller in chunks.

pub mod bot;
pub mod config;
pub mod error;
pub mod health;
pub mod network;
pub mod output;
pub mod scanner;
pub mod utils;

// Re-export commonly used types
pub use config::{BotConfig, MalformedLinePolicy, ScanConfig};
pub use error::{ScanError, ScanResult};
pub use network::socket::{Prober, TcpConnectProber};
pub use network::{ProbeOutcome, Reachability};
pub use output::{ReplySink, ResultFlusher, StdoutSink};
pub use scanner::engine::ScanEngine;
pub use utils::target_parser::TargetParser;

pub type Result<T> = std::result::Result<T, ScanError>;
