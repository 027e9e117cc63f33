use anyhow::ensure;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "naturedopes-api")]
#[command(about = "Image records API with API keys and per-key/per-address rate limiting")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Max requests per API key per key window
    #[arg(long, default_value_t = 100)]
    pub key_limit: u32,

    // Key window in seconds
    #[arg(long, default_value_t = 3600)]
    pub key_window: u64,

    // Max requests per client address per address window
    #[arg(long, default_value_t = 1000)]
    pub address_limit: u32,

    // Address window in seconds
    #[arg(long, default_value_t = 86_400)]
    pub address_window: u64,

    // How often idle rate limit entries are evicted, in seconds
    #[arg(long, default_value_t = 600)]
    pub cleanup_interval: u64,

    // Lifetime of newly issued API keys
    #[arg(long, default_value_t = 90)]
    pub api_key_ttl_days: u32,

    // JSON array of image records to serve
    #[arg(long)]
    pub images_file: Option<PathBuf>,
}

impl Args {
    /// Builds the limiter settings, rejecting zero limits and zero durations.
    pub fn rate_limit_config(&self) -> anyhow::Result<RateLimitConfig> {
        let config = RateLimitConfig {
            key_limit: self.key_limit,
            key_window: Duration::from_secs(self.key_window),
            address_limit: self.address_limit,
            address_window: Duration::from_secs(self.address_window),
            cleanup_interval: Duration::from_secs(self.cleanup_interval),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub key_limit: u32,
    pub key_window: Duration,
    pub address_limit: u32,
    pub address_window: Duration,
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            key_limit: 100,
            key_window: Duration::from_secs(60 * 60),
            address_limit: 1000,
            address_window: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.key_limit > 0, "key limit must be positive");
        ensure!(self.address_limit > 0, "address limit must be positive");
        ensure!(!self.key_window.is_zero(), "key window must be positive");
        ensure!(!self.address_window.is_zero(), "address window must be positive");
        ensure!(
            !self.cleanup_interval.is_zero(),
            "cleanup interval must be positive"
        );
        Ok(())
    }
}
