//! Configuration for the depth snapshot/stream clients and the sync loop.
//!
//! This module provides the [`Config`] struct for choosing the instrument,
//! environment and transport settings, plus [`SyncConfig`] for tuning the
//! snapshot reconciliation.

use std::time::Duration;

use crate::error::Error;

/// API environment (production or testnet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production spot market data
    #[default]
    Production,
    /// Spot testnet
    Testnet,
}

impl Environment {
    /// Get the base URL for REST API
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://api.binance.com",
            Environment::Testnet => "https://testnet.binance.vision",
        }
    }

    /// Get the WebSocket base URL (raw streams live under `/ws/`)
    pub fn websocket_url(&self) -> &'static str {
        match self {
            Environment::Production => "wss://stream.binance.com:9443",
            Environment::Testnet => "wss://stream.testnet.binance.vision",
        }
    }
}

/// Push interval of the diff-depth stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateSpeed {
    /// `<symbol>@depth` (1000ms)
    #[default]
    Standard,
    /// `<symbol>@depth@100ms`
    Fast,
}

impl UpdateSpeed {
    /// Stream name suffix for this speed
    pub fn stream_suffix(&self) -> &'static str {
        match self {
            UpdateSpeed::Standard => "@depth",
            UpdateSpeed::Fast => "@depth@100ms",
        }
    }
}

/// How long to buffer stream events before the first snapshot request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmUp {
    /// Wait a fixed amount of time
    Fixed(Duration),
    /// Proceed as soon as one update has been buffered, or after `timeout`
    FirstUpdate {
        /// Upper bound on the wait
        timeout: Duration,
    },
}

impl Default for WarmUp {
    fn default() -> Self {
        WarmUp::Fixed(Duration::from_secs(2))
    }
}

/// Tuning for the snapshot/stream reconciliation
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use depth_sync::config::{SyncConfig, WarmUp};
///
/// let sync = SyncConfig::new()
///     .with_max_snapshot_attempts(5)
///     .with_retry_delay(Duration::from_millis(500))
///     .with_warm_up(WarmUp::FirstUpdate { timeout: Duration::from_secs(5) });
/// assert_eq!(sync.max_snapshot_attempts(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    warm_up: WarmUp,
    max_snapshot_attempts: u32,
    retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            warm_up: WarmUp::default(),
            max_snapshot_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl SyncConfig {
    /// Create a sync config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the warm-up policy
    #[must_use]
    pub fn with_warm_up(mut self, warm_up: WarmUp) -> Self {
        self.warm_up = warm_up;
        self
    }

    /// Set the snapshot attempt budget per reconciliation cycle
    #[must_use]
    pub fn with_max_snapshot_attempts(mut self, attempts: u32) -> Self {
        self.max_snapshot_attempts = attempts;
        self
    }

    /// Set the delay between snapshot attempts
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Get the warm-up policy
    pub fn warm_up(&self) -> WarmUp {
        self.warm_up
    }

    /// Get the snapshot attempt budget
    pub fn max_snapshot_attempts(&self) -> u32 {
        self.max_snapshot_attempts
    }

    /// Get the delay between snapshot attempts
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

/// Configuration for a single-instrument depth book
///
/// # Example
///
/// ```rust
/// use depth_sync::Config;
/// use depth_sync::config::{Environment, UpdateSpeed};
///
/// let config = Config::new("btcusdt")
///     .with_environment(Environment::Testnet)
///     .with_update_speed(UpdateSpeed::Fast)
///     .with_timeout(std::time::Duration::from_secs(30));
///
/// assert_eq!(config.symbol(), "BTCUSDT");
/// assert!(config.stream_url().unwrap().as_str().ends_with("/ws/btcusdt@depth@100ms"));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Instrument symbol, upper-cased (e.g. "BTCUSDT")
    symbol: String,

    /// API environment
    environment: Environment,

    /// REST base URL overriding the environment's
    rest_base_url: Option<String>,

    /// WebSocket base URL overriding the environment's
    stream_base_url: Option<String>,

    /// HTTP request timeout
    timeout: Duration,

    /// Levels per side requested in the snapshot
    snapshot_limit: u32,

    /// Diff stream push interval
    update_speed: UpdateSpeed,

    /// Max silence on the stream before the connection is considered dead
    read_timeout: Option<Duration>,

    /// Interval for periodic top-of-book rendering
    render_interval: Duration,

    /// Reconciliation tuning
    sync: SyncConfig,
}

impl Config {
    /// Create a new configuration for `symbol`
    ///
    /// The symbol is upper-cased for REST requests; the stream name uses the
    /// lower-cased form.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            environment: Environment::default(),
            rest_base_url: None,
            stream_base_url: None,
            timeout: Duration::from_secs(10),
            snapshot_limit: 5000,
            update_speed: UpdateSpeed::default(),
            read_timeout: Some(Duration::from_secs(30)),
            render_interval: Duration::from_secs(2),
            sync: SyncConfig::default(),
        }
    }

    /// Set the API environment (production or testnet)
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Send REST requests to `url` instead of the environment's endpoint
    ///
    /// Useful for a local relay or a recording proxy.
    #[must_use]
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = Some(url.into());
        self
    }

    /// Open the stream at `url` instead of the environment's endpoint
    ///
    /// The `/ws/<symbol>@depth` path is still appended.
    #[must_use]
    pub fn with_stream_base_url(mut self, url: impl Into<String>) -> Self {
        self.stream_base_url = Some(url.into());
        self
    }

    /// Set the HTTP request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of levels per side requested in the snapshot
    #[must_use]
    pub fn with_snapshot_limit(mut self, limit: u32) -> Self {
        self.snapshot_limit = limit;
        self
    }

    /// Set the diff stream push interval
    #[must_use]
    pub fn with_update_speed(mut self, speed: UpdateSpeed) -> Self {
        self.update_speed = speed;
        self
    }

    /// Set the stream read timeout (`None` waits forever)
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the rendering interval
    #[must_use]
    pub fn with_render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    /// Set the reconciliation tuning
    #[must_use]
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Check the configuration for values the sync loop cannot work with
    pub fn validate(&self) -> Result<(), Error> {
        if self.symbol.is_empty() {
            return Err(Error::Config("symbol must not be empty".to_string()));
        }
        if !self.symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!("invalid symbol: {}", self.symbol)));
        }
        if self.sync.max_snapshot_attempts == 0 {
            return Err(Error::Config(
                "max_snapshot_attempts must be at least 1".to_string(),
            ));
        }
        if !(1..=5000).contains(&self.snapshot_limit) {
            return Err(Error::Config(format!(
                "snapshot_limit must be within 1..=5000, got {}",
                self.snapshot_limit
            )));
        }
        Ok(())
    }

    /// Get the symbol (upper-case)
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the environment
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Get the REST API base URL
    pub fn rest_base_url(&self) -> &str {
        self.rest_base_url
            .as_deref()
            .unwrap_or(self.environment.rest_base_url())
    }

    /// Get the WebSocket base URL
    pub fn stream_base_url(&self) -> &str {
        self.stream_base_url
            .as_deref()
            .unwrap_or(self.environment.websocket_url())
    }

    /// Full URL of the diff-depth stream for this symbol
    pub fn stream_url(&self) -> Result<url::Url, Error> {
        let path = format!(
            "/ws/{}{}",
            self.symbol.to_lowercase(),
            self.update_speed.stream_suffix()
        );
        Ok(url::Url::parse(self.stream_base_url())?.join(&path)?)
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the snapshot depth limit
    pub fn snapshot_limit(&self) -> u32 {
        self.snapshot_limit
    }

    /// Get the stream push interval
    pub fn update_speed(&self) -> UpdateSpeed {
        self.update_speed
    }

    /// Get the stream read timeout
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Get the rendering interval
    pub fn render_interval(&self) -> Duration {
        self.render_interval
    }

    /// Get the reconciliation tuning
    pub fn sync(&self) -> &SyncConfig {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new("btcusdt");
        assert_eq!(config.symbol(), "BTCUSDT");
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.snapshot_limit(), 5000);
        assert_eq!(config.sync().max_snapshot_attempts(), 3);
        assert_eq!(config.sync().retry_delay(), Duration::from_secs(1));
        assert_eq!(
            config.sync().warm_up(),
            WarmUp::Fixed(Duration::from_secs(2))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_url() {
        let config = Config::new("ETHUSDT");
        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "wss://stream.binance.com:9443/ws/ethusdt@depth"
        );

        let config = Config::new("ethusdt")
            .with_environment(Environment::Testnet)
            .with_update_speed(UpdateSpeed::Fast);
        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "wss://stream.testnet.binance.vision/ws/ethusdt@depth@100ms"
        );
    }

    #[test]
    fn test_base_url_overrides() {
        let config = Config::new("BNBBTC")
            .with_environment(Environment::Testnet)
            .with_rest_base_url("http://127.0.0.1:8080")
            .with_stream_base_url("ws://127.0.0.1:9001");

        assert_eq!(config.rest_base_url(), "http://127.0.0.1:8080");
        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "ws://127.0.0.1:9001/ws/bnbbtc@depth"
        );
        assert!(Config::new("BNBBTC").with_stream_base_url("not a url").stream_url().is_err());
    }

    #[test]
    fn test_testnet_environment() {
        let config = Config::new("BTCUSDT").with_environment(Environment::Testnet);
        assert!(config.rest_base_url().contains("testnet"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = Config::new("BTCUSDT")
            .with_timeout(Duration::from_secs(30))
            .with_snapshot_limit(1000)
            .with_read_timeout(None)
            .with_sync(SyncConfig::new().with_max_snapshot_attempts(5));

        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.snapshot_limit(), 1000);
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.sync().max_snapshot_attempts(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::new("  ").validate().is_err());
        assert!(Config::new("BTC/USDT").validate().is_err());
        assert!(Config::new("BTCUSDT")
            .with_snapshot_limit(0)
            .validate()
            .is_err());
        assert!(Config::new("BTCUSDT")
            .with_sync(SyncConfig::new().with_max_snapshot_attempts(0))
            .validate()
            .is_err());
    }
}
