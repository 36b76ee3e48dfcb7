//! TCP connect probing

use crate::network::{ProbeOutcome, Reachability};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Something that can decide whether one address answers.
///
/// Implementations must not fail: every error is an `Unreachable` outcome.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: IpAddr) -> ProbeOutcome;
}

/// Single-attempt TCP connect prober with a hard timeout
#[derive(Debug, Clone)]
pub struct TcpConnectProber {
    port: u16,
    timeout: Duration,
}

impl TcpConnectProber {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect once to `target:port`, closing the stream straight away on success
    pub async fn scan_port(&self, target: IpAddr) -> Reachability {
        let addr = SocketAddr::new(target, self.port);

        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                Reachability::Reachable
            }
            Ok(Err(e)) => {
                log::trace!("{} refused: {}", addr, e);
                Reachability::Unreachable
            }
            Err(_) => {
                log::trace!("{} timed out after {:?}", addr, self.timeout);
                Reachability::Unreachable
            }
        }
    }
}

#[async_trait]
impl Prober for TcpConnectProber {
    async fn probe(&self, address: IpAddr) -> ProbeOutcome {
        let start_time = Instant::now();
        let reachability = self.scan_port(address).await;
        ProbeOutcome::new(address, reachability, start_time.elapsed())
    }
}
