//! Reply formatting and delivery
//!
//! Live hosts are not sent one by one. The [`ResultFlusher`] buffers them and
//! hands the reply sink one message per `flush_threshold` hosts, plus a final
//! message for whatever is left when the scan ends.

use async_trait::async_trait;
use colored::*;
use std::net::IpAddr;

pub const ACK_MESSAGE: &str = "🚀 Fast scan in progress... please wait.";
pub const CHUNK_HEADER: &str = "✅ Found:";
pub const FINAL_HEADER: &str = "✅ Final results:";
pub const NO_RESULTS_MESSAGE: &str = "🏁 Fast scan finished.";
pub const ERROR_PREFIX: &str = "❌ Error:";

/// Longest error description echoed back, in characters
pub const MAX_ERROR_DETAIL: usize = 200;

/// Destination for the text replies of one scan request, in order.
#[async_trait]
pub trait ReplySink: Send {
    async fn send(&mut self, text: String) -> crate::Result<()>;
}

/// Collects replies in memory.
#[async_trait]
impl ReplySink for Vec<String> {
    async fn send(&mut self, text: String) -> crate::Result<()> {
        self.push(text);
        Ok(())
    }
}

/// Render a failed request as a single reply
pub fn error_message(error: &crate::ScanError) -> String {
    format!("{} {}", ERROR_PREFIX, truncate(&error.to_string(), MAX_ERROR_DETAIL))
}

/// Cut `text` to at most `max` characters, marking the cut with `…`
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some(_) => {
            let kept: String = text.chars().take(max.saturating_sub(1)).collect();
            format!("{}…", kept)
        }
        None => text.to_string(),
    }
}

/// Split `text` into pieces of at most `limit` characters, breaking at line
/// boundaries where possible. Lines longer than `limit` are cut hard.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let mut chars: Vec<char> = line.chars().collect();

        // Oversized line: emit full-size slices first
        while chars.len() > limit {
            if current_len > 0 {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = chars.split_off(limit);
            pieces.push(chars.into_iter().collect());
            chars = rest;
        }

        let needed = if current_len == 0 { chars.len() } else { current_len + 1 + chars.len() };
        if needed > limit {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current_len += chars.len();
        current.extend(chars);
    }

    if current_len > 0 {
        pieces.push(current);
    }
    pieces
}

/// Render a chunk of live hosts under a header
pub fn chunk_message(header: &str, addresses: &[IpAddr]) -> String {
    let mut text = String::from(header);
    for address in addresses {
        text.push('\n');
        text.push_str(&address.to_string());
    }
    text
}

/// Buffers reachable addresses and emits them in fixed-size chunks
#[derive(Debug)]
pub struct ResultFlusher {
    threshold: usize,
    buffer: Vec<IpAddr>,
    total_found: usize,
    chunks_sent: usize,
}

impl ResultFlusher {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            buffer: Vec::with_capacity(threshold),
            total_found: 0,
            chunks_sent: 0,
        }
    }

    /// Add a live host, flushing a full chunk as soon as the threshold is hit
    pub async fn accumulate<S>(&mut self, address: IpAddr, sink: &mut S) -> crate::Result<()>
    where
        S: ReplySink + ?Sized,
    {
        self.buffer.push(address);
        self.total_found += 1;

        if self.buffer.len() >= self.threshold {
            self.flush(CHUNK_HEADER, sink).await?;
        }
        Ok(())
    }

    /// Send what is left, or the no-results notice if nothing was ever found
    pub async fn finalize<S>(mut self, sink: &mut S) -> crate::Result<FlushStats>
    where
        S: ReplySink + ?Sized,
    {
        if !self.buffer.is_empty() {
            self.flush(FINAL_HEADER, sink).await?;
        } else if self.total_found == 0 {
            sink.send(NO_RESULTS_MESSAGE.to_string()).await?;
        }

        Ok(FlushStats {
            total_found: self.total_found,
            chunks_sent: self.chunks_sent,
        })
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn total_found(&self) -> usize {
        self.total_found
    }

    async fn flush<S>(&mut self, header: &str, sink: &mut S) -> crate::Result<()>
    where
        S: ReplySink + ?Sized,
    {
        let text = chunk_message(header, &self.buffer);
        self.buffer.clear();
        self.chunks_sent += 1;
        sink.send(text).await
    }
}

/// Counters reported by [`ResultFlusher::finalize`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub total_found: usize,
    pub chunks_sent: usize,
}

/// Prints replies to the terminal for one-shot CLI scans
#[derive(Debug, Default)]
pub struct StdoutSink {
    greppable: bool,
}

impl StdoutSink {
    pub fn new(greppable: bool) -> Self {
        Self { greppable }
    }

    fn render(&self, text: &str) -> Option<String> {
        let (header, body) = match text.split_once('\n') {
            Some((header, body)) => (header, Some(body)),
            None => (text, None),
        };

        if self.greppable {
            // Only the addresses, one per line
            return match header {
                CHUNK_HEADER | FINAL_HEADER => body.map(str::to_string),
                _ => None,
            };
        }

        let header = if header.starts_with(ERROR_PREFIX) {
            header.bright_red().bold().to_string()
        } else if header == CHUNK_HEADER || header == FINAL_HEADER {
            header.bright_green().bold().to_string()
        } else {
            header.bright_blue().to_string()
        };

        Some(match body {
            Some(body) => format!("{}\n{}", header, body),
            None => header,
        })
    }
}

#[async_trait]
impl ReplySink for StdoutSink {
    async fn send(&mut self, text: String) -> crate::Result<()> {
        if let Some(rendered) = self.render(&text) {
            println!("{}", rendered);
        }
        Ok(())
    }
}
