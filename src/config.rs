use crate::cache::ControllerConfig;
use crate::cache::controller::DEFAULT_DEDUP_INTERVAL;
use crate::client::DEFAULT_REQUEST_TIMEOUT;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// `token:user,token:user`
    pub session_tokens: String,
    pub demo_data: bool,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub session_token: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dedup_interval_ms: u64,
    pub revalidate_on_focus: bool,
    pub revalidate_on_reconnect: bool,
    pub refresh_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub cache: CacheConfig,
    /// Enable debug logging for API requests (set via CLI)
    pub debug_requests: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .context("PORT must be a port number")?;

        let request_timeout_ms = parse_millis(&var, "TRAWL_REQUEST_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT.as_millis() as u64);
        let dedup_interval_ms = parse_millis(&var, "TRAWL_DEDUP_INTERVAL_MS")?
            .unwrap_or(DEFAULT_DEDUP_INTERVAL.as_millis() as u64);
        let refresh_interval_ms =
            parse_millis(&var, "TRAWL_REFRESH_INTERVAL_MS")?.filter(|ms| *ms > 0);

        Ok(Self {
            server: ServerConfig {
                port,
                session_tokens: var("TRAWL_SESSION_TOKENS").unwrap_or_default(),
                demo_data: parse_flag(var("TRAWL_DEMO_DATA").as_deref()),
            },
            client: ClientConfig {
                api_url: var("TRAWL_API_URL")
                    .unwrap_or_else(|| format!("http://127.0.0.1:{}", port)),
                session_token: var("TRAWL_SESSION_TOKEN").filter(|t| !t.is_empty()),
                request_timeout_ms,
            },
            cache: CacheConfig {
                dedup_interval_ms,
                revalidate_on_focus: parse_flag(var("TRAWL_REVALIDATE_ON_FOCUS").as_deref()),
                revalidate_on_reconnect: parse_flag(
                    var("TRAWL_REVALIDATE_ON_RECONNECT").as_deref(),
                ),
                refresh_interval_ms,
            },
            debug_requests: false, // Set by CLI args in main.rs
        })
    }

    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            dedup_interval: Duration::from_millis(self.cache.dedup_interval_ms),
            revalidate_on_focus: self.cache.revalidate_on_focus,
            revalidate_on_reconnect: self.cache.revalidate_on_reconnect,
            refresh_interval: self.cache.refresh_interval_ms.map(Duration::from_millis),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.client.request_timeout_ms)
    }
}

/// `1`, `true`, `yes` and `on` enable a flag; anything else leaves it off.
fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn parse_millis<F>(var: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a number of milliseconds", name))
        })
        .transpose()
}
