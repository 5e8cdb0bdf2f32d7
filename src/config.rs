use std::env;
use std::time::Duration;

use crate::inbox::DEFAULT_CAPACITY;

/// Default poll interval for invoice watchers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Credentials for the durable REST key-value store.
#[derive(Clone)]
pub struct KvConfig {
    pub url: String,
    pub token: String,
    /// Key prefix; the inbox uses `{prefix}:ids` and `{prefix}:items`.
    pub prefix: String,
}

impl std::fmt::Debug for KvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvConfig")
            .field("url", &self.url)
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct InboxConfig {
    pub capacity: usize,
    /// `None` means the in-memory store.
    pub kv: Option<KvConfig>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            kv: None,
        }
    }
}

#[derive(Clone)]
pub struct PspCoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for PspCoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PspCoreConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Requests per minute per client IP. Zero disables the limiter.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub webhook_rpm: u32,
    pub ops_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            webhook_rpm: 120,
            ops_rpm: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            webhook_rpm: 0,
            ops_rpm: 0,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
    pub webhook_secret: Option<String>,
    /// Optional replay window for webhook timestamps. Off unless configured.
    pub webhook_tolerance_secs: Option<i64>,
    pub inbox_read_token: Option<String>,
    pub inbox: InboxConfig,
    pub psp_core: PspCoreConfig,
    pub poll_interval: Duration,
    pub rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dev_mode", &self.dev_mode)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("inbox_read_token", &self.inbox_read_token.as_ref().map(|_| "<redacted>"))
            .field("inbox", &self.inbox)
            .field("psp_core", &self.psp_core)
            .field("poll_interval", &self.poll_interval)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

/// Non-empty trimmed env var.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = var(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PSP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parsed("PORT").unwrap_or(3000);

        // Both halves are required; one without the other means memory.
        let kv = match (var("KV_REST_API_URL"), var("KV_REST_API_TOKEN")) {
            (Some(url), Some(token)) => Some(KvConfig {
                url,
                token,
                prefix: var("INBOX_KV_PREFIX").unwrap_or_else(|| "psp:webhooks".to_string()),
            }),
            _ => None,
        };

        let defaults = RateLimitConfig::default();

        Self {
            host,
            port,
            dev_mode,
            webhook_secret: var("PSP_WEBHOOK_SECRET"),
            webhook_tolerance_secs: parsed("PSP_WEBHOOK_TOLERANCE_SECS"),
            inbox_read_token: var("INBOX_READ_TOKEN"),
            inbox: InboxConfig {
                capacity: parsed::<usize>("INBOX_CAPACITY")
                    .filter(|c| *c > 0)
                    .unwrap_or(DEFAULT_CAPACITY),
                kv,
            },
            psp_core: PspCoreConfig {
                base_url: var("PSP_CORE_URL").unwrap_or_else(|| "http://127.0.0.1:4000".to_string()),
                api_key: var("PSP_CORE_API_KEY"),
            },
            poll_interval: parsed::<u64>("POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            rate_limit: RateLimitConfig {
                webhook_rpm: parsed("RATE_LIMIT_WEBHOOK_RPM").unwrap_or(defaults.webhook_rpm),
                ops_rpm: parsed("RATE_LIMIT_OPS_RPM").unwrap_or(defaults.ops_rpm),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
