//! Main scanning engine implementation
//!
//! Probes run in batches of `concurrency` addresses. All probes of a batch are
//! polled together on the calling task and the next batch starts only once
//! every probe of the current one has finished or timed out, so no more than
//! `concurrency` sockets are ever open for one request.

use crate::config::ScanConfig;
use crate::network::socket::{Prober, TcpConnectProber};
use crate::output::{self, ReplySink, ResultFlusher};
use crate::scanner::{create_batches, BatchResult, ScanBatch, ScanSummary};
use crate::utils::target_parser::TargetParser;
use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use std::net::IpAddr;
use std::time::Instant;

/// Main scanning engine
pub struct ScanEngine<P = TcpConnectProber> {
    config: ScanConfig,
    parser: TargetParser,
    prober: P,
}

impl ScanEngine<TcpConnectProber> {
    /// Create a new scan engine probing over plain TCP connects
    pub fn new(config: ScanConfig) -> crate::Result<Self> {
        let prober = TcpConnectProber::new(config.port, config.timeout_duration());
        Self::with_prober(config, prober)
    }
}

impl<P: Prober> ScanEngine<P> {
    /// Create a new scan engine around any prober
    pub fn with_prober(config: ScanConfig, prober: P) -> crate::Result<Self> {
        config.validate()?;
        let parser = TargetParser::from_config(&config);

        Ok(Self {
            config,
            parser,
            prober,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Expand request text into the target set
    pub fn expand(&self, raw_text: &str) -> crate::Result<Vec<IpAddr>> {
        self.parser.expand(raw_text)
    }

    /// Probe every address of one batch concurrently and wait for all of them
    pub async fn scan_batch(&self, batch: ScanBatch) -> BatchResult {
        let start_time = Instant::now();
        let outcomes = join_all(batch.addresses.iter().map(|&address| self.prober.probe(address))).await;

        BatchResult {
            batch_id: batch.batch_id,
            outcomes,
            duration: start_time.elapsed(),
        }
    }

    /// Lazily run the batches one after another, yielding each as it completes
    pub fn batches<'a>(&'a self, targets: &[IpAddr]) -> impl Stream<Item = BatchResult> + Send + 'a {
        let batches = create_batches(targets, self.config.concurrency);
        stream::iter(batches).then(move |batch| self.scan_batch(batch))
    }

    /// Lazily yield reachable addresses, batch by batch
    pub fn reachable<'a>(&'a self, targets: &[IpAddr]) -> impl Stream<Item = IpAddr> + Send + 'a {
        self.batches(targets)
            .flat_map(|batch| stream::iter(batch.reachable()))
    }

    /// Handle one scan request from raw text to the last reply
    pub async fn run<S>(&self, raw_text: &str, sink: &mut S) -> crate::Result<ScanSummary>
    where
        S: ReplySink + ?Sized,
    {
        log::info!("Scanning: {}", raw_text.trim());
        sink.send(output::ACK_MESSAGE.to_string()).await?;

        let targets = match self.expand(raw_text) {
            Ok(targets) => targets,
            Err(e) => {
                log::error!("Error: {}", e);
                sink.send(output::error_message(&e)).await?;
                return Err(e);
            }
        };
        log::info!(
            "Probing {} addresses on port {} ({} at a time)",
            targets.len(),
            self.config.port,
            self.config.concurrency
        );

        let start_time = Instant::now();
        let mut flusher = ResultFlusher::new(self.config.flush_threshold);
        let mut batch_count = 0usize;

        let batches = self.batches(&targets);
        futures::pin_mut!(batches);

        while let Some(batch) = batches.next().await {
            batch_count += 1;
            let found = batch.reachable();
            log::debug!(
                "Batch {} finished: {}/{} reachable in {:?}",
                batch.batch_id,
                found.len(),
                batch.outcomes.len(),
                batch.duration
            );

            for address in found {
                flusher.accumulate(address, &mut *sink).await?;
            }
        }

        let stats = flusher.finalize(&mut *sink).await?;
        let summary = ScanSummary {
            targets: targets.len(),
            reachable: stats.total_found,
            batches: batch_count,
            chunks: stats.chunks_sent,
            duration: start_time.elapsed(),
        };

        log::info!("Scan finished: {}", summary);
        Ok(summary)
    }
}
