use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub identity: IdentityConfig,
    pub counters: CounterConfig,
    pub pagination: PaginationConfig,
    pub client_ip: ClientIpConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Key for hashing visitor addresses into identities
    pub ip_hash_secret: String,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("ip_hash_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Upper bound on likes a single visitor can give a single post
    pub max_likes_per_visitor: i64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            max_likes_per_visitor: CounterConfig::DEFAULT_MAX_LIKES,
        }
    }
}

impl CounterConfig {
    pub const DEFAULT_MAX_LIKES: i64 = 3;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Secret for signing list cursors. Random per process when unset.
    pub cursor_hmac_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    #[default]
    None,
    Cloudflare,
    Standard,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientIpConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

fn parse_trusted_proxy_mode(value: &str) -> TrustedProxyMode {
    match value.to_lowercase().as_str() {
        "none" | "" => TrustedProxyMode::None,
        "cloudflare" => TrustedProxyMode::Cloudflare,
        "standard" => TrustedProxyMode::Standard,
        other => {
            tracing::warn!(
                "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, cloudflare, standard"
            );
            TrustedProxyMode::None
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_cidrs(value: &str) -> anyhow::Result<Vec<IpNet>> {
    parse_list(value)
        .iter()
        .map(|entry| {
            // Bare addresses are accepted as single-host networks
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid entry '{entry}' in TRUSTED_PROXIES"))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let ip_hash_secret = std::env::var("IP_HASH_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .context("IP_HASH_SECRET must be set to a non-empty value")?;

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./tally.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let max_likes_per_visitor = match std::env::var("LIKE_MAX_PER_VISITOR") {
            Ok(v) => v
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 1)
                .with_context(|| format!("LIKE_MAX_PER_VISITOR must be >= 1, got '{v}'"))?,
            Err(_) => CounterConfig::DEFAULT_MAX_LIKES,
        };

        let cursor_hmac_secret = std::env::var("CURSOR_HMAC_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let trusted_proxy_mode = parse_trusted_proxy_mode(
            &std::env::var("TRUSTED_PROXY_MODE").unwrap_or_default(),
        );
        let trusted_proxies = parse_cidrs(&std::env::var("TRUSTED_PROXIES").unwrap_or_default())?;
        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| {
                v.parse::<usize>()
                    .with_context(|| format!("NUM_TRUSTED_PROXIES must be an integer, got '{v}'"))
            })
            .transpose()?;

        let allowed_origins =
            parse_list(&std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default());

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
            identity: IdentityConfig { ip_hash_secret },
            counters: CounterConfig {
                max_likes_per_visitor,
            },
            pagination: PaginationConfig { cursor_hmac_secret },
            client_ip: ClientIpConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            cors: CorsConfig { allowed_origins },
        })
    }
}
