//! Service configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use fulfillment::{FeedConfig, WorkerConfig};

/// Which parts of the pipeline this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceRole {
    Feed,
    Worker,
    #[default]
    All,
}

impl ServiceRole {
    pub fn runs_feed(self) -> bool {
        matches!(self, ServiceRole::Feed | ServiceRole::All)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, ServiceRole::Worker | ServiceRole::All)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceRole::Feed => "feed",
            ServiceRole::Worker => "worker",
            ServiceRole::All => "all",
        }
    }
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" => Ok(ServiceRole::Feed),
            "worker" => Ok(ServiceRole::Worker),
            "all" => Ok(ServiceRole::All),
            other => Err(format!("unknown service role: {other}")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SERVICE_ROLE`: `feed`, `worker` or `all` (default: `all`)
/// - `HOST`, `PORT`: ops endpoint bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL stores when set, in-memory otherwise
/// - `REDIS_URL`: Redis channel when set (requires the `redis` feature)
/// - `FEED_POLL_INTERVAL_SECS`, `FEED_BATCH_LIMIT`, `FEED_INITIAL_LOOKBACK_SECS`,
///   `FEED_DEDUP_TTL_SECS` (0 keeps entries forever)
/// - `WORKER_TIMEOUT_SECS`, `WORKER_COMPENSATION_TIMEOUT_SECS`, `WORKER_MAX_IN_FLIGHT`
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub role: ServiceRole,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub feed: FeedConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_secs).unwrap_or(default)
        };
        let nonzero_secs = |key: &str, default: Duration| {
            parsed(key)
                .map(Duration::from_secs)
                .filter(|d| !d.is_zero())
                .unwrap_or(default)
        };
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let feed = FeedConfig {
            poll_interval: nonzero_secs("FEED_POLL_INTERVAL_SECS", defaults.feed.poll_interval),
            batch_limit: parsed("FEED_BATCH_LIMIT")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.feed.batch_limit),
            initial_lookback: secs("FEED_INITIAL_LOOKBACK_SECS", defaults.feed.initial_lookback),
            dedup_ttl: match parsed("FEED_DEDUP_TTL_SECS") {
                Some(0) => None,
                Some(n) => Some(Duration::from_secs(n)),
                None => defaults.feed.dedup_ttl,
            },
            backlog_sweep_every: parsed("FEED_BACKLOG_SWEEP_EVERY")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.feed.backlog_sweep_every),
        };

        let worker = WorkerConfig {
            timeout: nonzero_secs("WORKER_TIMEOUT_SECS", defaults.worker.timeout),
            compensation_timeout: nonzero_secs(
                "WORKER_COMPENSATION_TIMEOUT_SECS",
                defaults.worker.compensation_timeout,
            ),
            max_in_flight: parsed("WORKER_MAX_IN_FLIGHT")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.worker.max_in_flight),
            claim_retry_backoff: defaults.worker.claim_retry_backoff,
        };

        Self {
            role: lookup("SERVICE_ROLE")
                .and_then(|r| r.parse().ok())
                .unwrap_or(defaults.role),
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            feed,
            worker,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: ServiceRole::default(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            database_url: None,
            redis_url: None,
            feed: FeedConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.role, ServiceRole::All);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.feed.poll_interval, Duration::from_secs(5));
        assert_eq!(config.feed.batch_limit, 100);
        assert_eq!(config.feed.initial_lookback, Duration::from_secs(60));
        assert_eq!(config.feed.dedup_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.worker.timeout, Duration::from_secs(10));
        assert_eq!(config.worker.compensation_timeout, Duration::from_secs(5));
        assert_eq!(config.worker.max_in_flight, 64);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("SERVICE_ROLE", "Worker"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("FEED_POLL_INTERVAL_SECS", "2"),
            ("FEED_BATCH_LIMIT", "10"),
            ("FEED_DEDUP_TTL_SECS", "0"),
            ("WORKER_TIMEOUT_SECS", "3"),
            ("WORKER_MAX_IN_FLIGHT", "8"),
        ]);

        assert_eq!(config.role, ServiceRole::Worker);
        assert!(!config.role.runs_feed());
        assert!(config.role.runs_worker());
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.feed.poll_interval, Duration::from_secs(2));
        assert_eq!(config.feed.batch_limit, 10);
        assert_eq!(config.feed.dedup_ttl, None);
        assert_eq!(config.worker.timeout, Duration::from_secs(3));
        assert_eq!(config.worker.max_in_flight, 8);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("SERVICE_ROLE", "janitor"),
            ("PORT", "not-a-port"),
            ("FEED_BATCH_LIMIT", "0"),
            ("WORKER_MAX_IN_FLIGHT", "-1"),
            ("DATABASE_URL", "  "),
        ]);

        assert_eq!(config.role, ServiceRole::All);
        assert_eq!(config.port, 3000);
        assert_eq!(config.feed.batch_limit, 100);
        assert_eq!(config.worker.max_in_flight, 64);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_zero_durations_fall_back() {
        let config = from_pairs(&[
            ("FEED_POLL_INTERVAL_SECS", "0"),
            ("WORKER_TIMEOUT_SECS", "0"),
            ("WORKER_COMPENSATION_TIMEOUT_SECS", "0"),
            ("FEED_INITIAL_LOOKBACK_SECS", "0"),
        ]);

        assert_eq!(config.feed.poll_interval, Duration::from_secs(5));
        assert_eq!(config.worker.timeout, Duration::from_secs(10));
        assert_eq!(config.worker.compensation_timeout, Duration::from_secs(5));
        assert_eq!(config.feed.initial_lookback, Duration::ZERO);
    }

    #[test]
    fn test_backlog_sweep_setting() {
        assert_eq!(from_pairs(&[]).feed.backlog_sweep_every, 12);
        let disabled = from_pairs(&[("FEED_BACKLOG_SWEEP_EVERY", "0")]);
        assert_eq!(disabled.feed.backlog_sweep_every, 0);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("feed".parse::<ServiceRole>(), Ok(ServiceRole::Feed));
        assert!(ServiceRole::Feed.runs_feed());
        assert!(!ServiceRole::Feed.runs_worker());
        assert!(ServiceRole::All.runs_feed() && ServiceRole::All.runs_worker());
        assert!("both".parse::<ServiceRole>().is_err());
    }
}
