use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

// Gateway configuration sourced from environment variables, with an
// optional YAML override file for ops-managed deployments.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // HTTP/WebSocket listener port.
    pub port: u16,
    // Prometheus listener bind address.
    pub metrics_bind: SocketAddr,
    // Messages kept per topic for replay.
    pub ring_buffer_size: usize,
    // Frames buffered per subscriber before drop-oldest kicks in.
    pub subscriber_queue_size: usize,
    // Heartbeat cadence; must stay below pong_wait.
    pub ping_period: Duration,
    // Read deadline for websocket peers.
    pub pong_wait: Duration,
    // Deadline for a single websocket write.
    pub write_wait: Duration,
    // Control-request read budget.
    pub read_timeout: Duration,
    // Control-request write budget.
    pub write_timeout: Duration,
    // Websocket inactivity limit; zero disables it.
    pub idle_timeout: Duration,
    // Bound on graceful shutdown drain.
    pub shutdown_timeout: Duration,
    // Whether API key authentication is enforced.
    pub auth_enabled: bool,
    // Acceptable API keys.
    pub api_keys: Vec<String>,
}

const DEFAULT_CONFIG_PATH: &str = "/etc/relay/gateway.yml";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9100";
const DEFAULT_RING_BUFFER_SIZE: usize = 100;
const DEFAULT_SUBSCRIBER_QUEUE_SIZE: usize = 100;
const DEFAULT_PING_PERIOD_SEC: u64 = 30;
const DEFAULT_PONG_WAIT_SEC: u64 = 60;
const DEFAULT_WRITE_WAIT_SEC: u64 = 10;
const DEFAULT_READ_TIMEOUT_SEC: u64 = 15;
const DEFAULT_WRITE_TIMEOUT_SEC: u64 = 15;
const DEFAULT_IDLE_TIMEOUT_SEC: u64 = 0;
const DEFAULT_SHUTDOWN_TIMEOUT_SEC: u64 = 10;

#[derive(Debug, Deserialize)]
struct GatewayConfigOverride {
    port: Option<u16>,
    metrics_bind: Option<String>,
    ring_buffer_size: Option<usize>,
    subscriber_queue_size: Option<usize>,
    ping_period_sec: Option<u64>,
    pong_wait_sec: Option<u64>,
    write_wait_sec: Option<u64>,
    read_timeout_sec: Option<u64>,
    write_timeout_sec: Option<u64>,
    idle_timeout_sec: Option<u64>,
    shutdown_timeout_sec: Option<u64>,
    auth_enabled: Option<bool>,
    api_keys: Option<Vec<String>>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self::base_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment configuration with overrides from the YAML file named by
    /// `GATEWAY_CONFIG` (or the default path when present).
    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::base_from_env()?;
        let override_path = std::env::var("GATEWAY_CONFIG").ok();
        let config_path = override_path
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let contents = match fs::read_to_string(&config_path) {
            Ok(contents) => Some(contents),
            Err(err) if err.kind() == ErrorKind::NotFound && override_path.is_none() => None,
            Err(err) => {
                return Err(err).with_context(|| format!("read gateway config: {config_path}"));
            }
        };
        if let Some(contents) = contents {
            let override_cfg: GatewayConfigOverride =
                serde_yaml::from_str(&contents).context("parse gateway config yaml")?;
            config.apply_override(override_cfg)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn base_from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let metrics_bind = std::env::var("METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .context("parse METRICS_BIND")?;
        let ring_buffer_size = std::env::var("RING_BUFFER_SIZE")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_RING_BUFFER_SIZE);
        let subscriber_queue_size = std::env::var("SUBSCRIBER_QUEUE_SIZE")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_SUBSCRIBER_QUEUE_SIZE);
        let ping_period = env_seconds("PING_PERIOD_SEC", DEFAULT_PING_PERIOD_SEC, false);
        let pong_wait = env_seconds("PONG_WAIT_SEC", DEFAULT_PONG_WAIT_SEC, false);
        let write_wait = env_seconds("WRITE_WAIT_SEC", DEFAULT_WRITE_WAIT_SEC, false);
        let read_timeout = env_seconds("READ_TIMEOUT_SEC", DEFAULT_READ_TIMEOUT_SEC, false);
        let write_timeout = env_seconds("WRITE_TIMEOUT_SEC", DEFAULT_WRITE_TIMEOUT_SEC, false);
        // Zero is meaningful here: it disables the inactivity limit.
        let idle_timeout = env_seconds("IDLE_TIMEOUT_SEC", DEFAULT_IDLE_TIMEOUT_SEC, true);
        let shutdown_timeout =
            env_seconds("SHUTDOWN_TIMEOUT_SEC", DEFAULT_SHUTDOWN_TIMEOUT_SEC, false);
        let auth_enabled = std::env::var("AUTH_ENABLED")
            .ok()
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes" | "TRUE" | "YES"))
            .unwrap_or(false);
        let api_keys = std::env::var("API_KEYS")
            .map(|value| parse_keys(&value))
            .unwrap_or_default();
        Ok(Self {
            port,
            metrics_bind,
            ring_buffer_size,
            subscriber_queue_size,
            ping_period,
            pong_wait,
            write_wait,
            read_timeout,
            write_timeout,
            idle_timeout,
            shutdown_timeout,
            auth_enabled,
            api_keys,
        })
    }

    fn apply_override(&mut self, override_cfg: GatewayConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.port {
            self.port = value;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().context("parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.ring_buffer_size {
            if value > 0 {
                self.ring_buffer_size = value;
            }
        }
        if let Some(value) = override_cfg.subscriber_queue_size {
            if value > 0 {
                self.subscriber_queue_size = value;
            }
        }
        if let Some(value) = override_cfg.ping_period_sec {
            self.ping_period = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.pong_wait_sec {
            self.pong_wait = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.write_wait_sec {
            self.write_wait = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.read_timeout_sec {
            self.read_timeout = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.write_timeout_sec {
            self.write_timeout = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.idle_timeout_sec {
            self.idle_timeout = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.shutdown_timeout_sec {
            self.shutdown_timeout = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.auth_enabled {
            self.auth_enabled = value;
        }
        if let Some(value) = override_cfg.api_keys {
            self.api_keys = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        // A heartbeat slower than the read deadline would evict live peers.
        if self.ping_period >= self.pong_wait {
            anyhow::bail!(
                "PING_PERIOD_SEC ({}s) must be strictly less than PONG_WAIT_SEC ({}s)",
                self.ping_period.as_secs(),
                self.pong_wait.as_secs()
            );
        }
        Ok(())
    }
}

fn env_seconds(key: &str, default_secs: u64, allow_zero: bool) -> Duration {
    let seconds = std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| allow_zero || *value > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(seconds)
}

fn parse_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect()
}
