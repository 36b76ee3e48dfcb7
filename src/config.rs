//! Configuration module for the portsweep scanner

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the bot token.
pub const TOKEN_ENV: &str = "TELEGRAM_TOKEN";

/// Environment variable holding the liveness endpoint port.
pub const HEALTH_PORT_ENV: &str = "PORT";

/// Largest accepted flush threshold. 100 IPv6 addresses still fit in one
/// 4096-character chat message.
pub const MAX_FLUSH_THRESHOLD: usize = 100;

/// What to do with a request line that is neither a range nor an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLinePolicy {
    /// Fail the whole request, naming the offending line.
    #[default]
    Reject,
    /// Log the line and continue with the remaining ones.
    Skip,
}

/// Scanning parameters shared by every request handled by one process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// TCP port probed on every address
    pub port: u16,

    /// Timeout for each connection attempt in milliseconds
    pub timeout: u64,

    /// Number of probes in flight at once (also the batch size)
    pub concurrency: usize,

    /// Number of live hosts collected before a chunk is sent
    pub flush_threshold: usize,

    /// Upper bound on the number of addresses one request may expand to
    pub max_targets: u64,

    /// Handling of malformed request lines
    pub malformed_lines: MalformedLinePolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            timeout: 1000,
            concurrency: 100,
            flush_threshold: 20,
            max_targets: 65536,
            malformed_lines: MalformedLinePolicy::Reject,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probed port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the timeout in milliseconds
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the concurrency ceiling
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    pub fn with_max_targets(mut self, max_targets: u64) -> Self {
        self.max_targets = max_targets;
        self
    }

    pub fn with_malformed_lines(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_lines = policy;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::ScanError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: ScanConfig = toml::from_str(&content)
            .map_err(|e| crate::ScanError::ConfigError(format!("Failed to parse TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `~/.portsweep.toml`, or defaults if absent
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let path = home_dir.join(".portsweep.toml");

        if path.exists() {
            match Self::from_toml_file(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.concurrency == 0 {
            return Err(crate::ScanError::ConfigError(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.flush_threshold == 0 {
            return Err(crate::ScanError::ConfigError(
                "Flush threshold must be greater than 0".to_string(),
            ));
        }

        if self.flush_threshold > MAX_FLUSH_THRESHOLD {
            return Err(crate::ScanError::ConfigError(format!(
                "Flush threshold cannot exceed {}",
                MAX_FLUSH_THRESHOLD
            )));
        }

        if self.timeout == 0 {
            return Err(crate::ScanError::ConfigError(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_targets == 0 {
            return Err(crate::ScanError::ConfigError(
                "Target limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Process-level settings for the chat front end. Only the bootstrap layer
/// reads these; the scanning core never sees the token.
#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    pub health_port: u16,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("health_port", &self.health_port)
            .finish()
    }
}

impl BotConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_ENV)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| crate::ScanError::ConfigError(format!("{} is missing!", TOKEN_ENV)))?;

        let health_port = match lookup(HEALTH_PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                crate::ScanError::ConfigError(format!("Invalid {} '{}': {}", HEALTH_PORT_ENV, raw, e))
            })?,
            None => 8080,
        };

        Ok(Self { token, health_port })
    }
}
