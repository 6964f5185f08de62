use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the features service (similar items)
    #[serde(default = "default_features_url")]
    pub features_url: String,

    /// Base URL of the listening history service
    #[serde(default = "default_history_url")]
    pub history_url: String,

    /// Number of recommendations returned when the request omits `k`
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// How many recent tracks seed the online recommendations
    #[serde(default = "default_history_k")]
    pub history_k: usize,

    /// Deadline for a single upstream call, in milliseconds
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// TCP connect deadline for upstream calls, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// JSON rows of per-user offline recommendations
    #[serde(default = "default_personal_recs_path")]
    pub personal_recs_path: String,

    /// JSON rows of the global fallback list
    #[serde(default = "default_default_recs_path")]
    pub default_recs_path: String,

    /// When set, offline recommendations are loaded from PostgreSQL instead of files
    #[serde(default)]
    pub database_url: Option<String>,

    /// When set, similar-item lookups are cached in Redis
    #[serde(default)]
    pub redis_url: Option<String>,

    /// TTL of cached similar-item lookups, in seconds
    #[serde(default = "default_similar_cache_ttl_secs")]
    pub similar_cache_ttl_secs: u64,

    /// Deadline for a single Redis round trip, in milliseconds; must stay
    /// below the upstream deadline so a stalled cache still leaves time for
    /// the upstream call
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_features_url() -> String {
    "http://127.0.0.1:8010".to_string()
}

fn default_history_url() -> String {
    "http://127.0.0.1:8020".to_string()
}

fn default_k() -> usize {
    100
}

fn default_history_k() -> usize {
    3
}

fn default_upstream_timeout_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_personal_recs_path() -> String {
    "data/recommendations.json".to_string()
}

fn default_default_recs_path() -> String {
    "data/top_popular.json".to_string()
}

fn default_similar_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_timeout_ms() -> u64 {
    100
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from explicit key/value pairs
    pub fn from_pairs<I>(pairs: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(pairs)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.history_k == 0 {
            anyhow::bail!("HISTORY_K must be at least 1");
        }
        if self.upstream_timeout_ms == 0 {
            anyhow::bail!("UPSTREAM_TIMEOUT_MS must be at least 1");
        }
        if self.cache_timeout_ms == 0 || self.cache_timeout_ms >= self.upstream_timeout_ms {
            anyhow::bail!(
                "CACHE_TIMEOUT_MS must be between 1 and UPSTREAM_TIMEOUT_MS ({}), got {}",
                self.upstream_timeout_ms,
                self.cache_timeout_ms
            );
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn similar_cache_ttl(&self) -> u64 {
        self.similar_cache_ttl_secs
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}
