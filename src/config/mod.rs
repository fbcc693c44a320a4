use anyhow::{bail, Context};
use chrono::FixedOffset;
use ipnet::IpNet;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    /// Public base used to build `shortUrl` values (no trailing slash)
    pub base_url: String,
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Read cache budget in weight units: one per cached link plus one per
    /// visit in its log
    pub max_weight: u64,
    pub ttl_secs: u64,
}

/// Which forwarding headers may be believed when extracting client IPs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// X-Forwarded-For, validated against the trusted proxy settings
    Standard,
    /// CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
    /// Offset applied before bucketing visits into days; 0 means UTC
    pub day_offset_minutes: i32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
            day_offset_minutes: 0,
        }
    }
}

impl AnalyticsConfig {
    pub fn day_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.day_offset_minutes * 60)
            .with_context(|| format!("invalid day offset: {} minutes", self.day_offset_minutes))
    }
}

impl CacheConfig {
    const DEFAULT_MAX_WEIGHT: u64 = 1_000_000;
    const DEFAULT_TTL_SECS: u64 = 30;
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_weight: Self::DEFAULT_MAX_WEIGHT,
            ttl_secs: Self::DEFAULT_TTL_SECS,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "memory" | "inmemory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./linktrail.db?mode=rwc".to_string());
        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 5u32)?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = parse_env("API_PORT", 8080u16)?;

        let redirect_host =
            std::env::var("REDIRECT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let redirect_port = parse_env("REDIRECT_PORT", 3000u16)?;

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{redirect_port}"))
            .trim_end_matches('/')
            .to_string();

        let cache = CacheConfig {
            max_weight: parse_env("CACHE_MAX_WEIGHT", CacheConfig::DEFAULT_MAX_WEIGHT)?,
            ttl_secs: parse_env("CACHE_TTL_SECS", CacheConfig::DEFAULT_TTL_SECS)?,
        };

        let trusted_proxy_mode = parse_proxy_mode(
            &std::env::var("TRUSTED_PROXY_MODE").unwrap_or_else(|_| "none".to_string()),
        );
        let trusted_proxies = match std::env::var("TRUSTED_PROXIES") {
            Ok(list) => parse_trusted_proxies(&list)?,
            Err(_) => Vec::new(),
        };
        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let day_offset_minutes = parse_env("ANALYTICS_DAY_OFFSET_MINUTES", 0i32)?;
        if day_offset_minutes.abs() >= 24 * 60 {
            bail!("ANALYTICS_DAY_OFFSET_MINUTES must be within one day of UTC");
        }

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            base_url,
            cache,
            analytics: AnalyticsConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
                day_offset_minutes,
            },
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {value}")),
        Err(_) => Ok(default),
    }
}

fn parse_proxy_mode(value: &str) -> TrustedProxyMode {
    match value.to_lowercase().as_str() {
        "none" | "" => TrustedProxyMode::None,
        "standard" => TrustedProxyMode::Standard,
        "cloudflare" => TrustedProxyMode::Cloudflare,
        other => {
            tracing::warn!(
                "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
            );
            TrustedProxyMode::None
        }
    }
}

/// Parse a comma separated list of CIDRs. Bare addresses are accepted as
/// single-host networks.
pub fn parse_trusted_proxies(list: &str) -> anyhow::Result<Vec<IpNet>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid trusted proxy entry: {entry}"))
        })
        .collect()
}
