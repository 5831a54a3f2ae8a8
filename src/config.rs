use eyre::{eyre, Result, WrapErr};
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::bounded_cache::cache_size_from_env;
use crate::clients::Credentials;
use crate::providers::{parse_rpc_urls, validate_rpc_url, AuthType, ChainProviders, ProviderEndpoint};
use crate::types::ChainId;

/// Main configuration for the ingestion node
#[derive(Debug, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub settlement: ApiConfig,
    pub store: ApiConfig,
    pub scan: ScanConfig,
    pub http: HttpConfig,
    pub announce: AnnounceConfig,
    pub api: ApiServerConfig,
}

/// One tracked chain and its ordered RPC endpoints
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Subset of `rpc_urls` that starts out operator-disabled
    pub disabled_rpc_urls: Vec<String>,
    pub rpc_auth: AuthType,
    pub enabled: bool,
}

impl ChainConfig {
    /// Build the endpoint registry in configured order
    pub fn build_providers(&self) -> ChainProviders {
        let endpoints = self
            .rpc_urls
            .iter()
            .map(|url| {
                ProviderEndpoint::new(url.clone(), self.rpc_auth.clone())
                    .with_active(!self.disabled_rpc_urls.contains(url))
            })
            .collect();
        ChainProviders::new(self.chain_id, endpoints)
    }
}

/// Authenticated HTTP collaborator (settlement API or store)
#[derive(Clone)]
pub struct ApiConfig {
    pub url: String,
    pub login: String,
    pub password: String,
}

impl ApiConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.login.clone(), self.password.clone())
    }
}

/// Custom Debug that redacts the password to prevent accidental log leakage.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub poll_interval_ms: u64,
    pub accepted_nonce_cache_size: usize,
}

impl ScanConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_ms: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Node announcement loop
#[derive(Debug, Clone)]
pub struct AnnounceConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl AnnounceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Operator API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl ApiServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .wrap_err_with(|| {
                format!(
                    "Invalid API bind address {}:{}",
                    self.bind_address, self.port
                )
            })
    }
}

/// Default functions
fn default_poll_interval() -> u64 {
    5000
}

fn default_http_timeout() -> u64 {
    30_000
}

fn default_announce_interval() -> u64 {
    5000
}

fn default_announce_max_attempts() -> u32 {
    720
}

fn default_api_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    9092
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

fn parsed_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let chains = load_chains_from_env()?;

        let settlement = ApiConfig {
            url: required_env("SETTLEMENT_API_URL")?,
            login: required_env("SETTLEMENT_API_LOGIN")?,
            password: required_env("SETTLEMENT_API_PASSWORD")?,
        };

        let store = ApiConfig {
            url: required_env("STORE_API_URL")?,
            login: required_env("STORE_LOGIN")?,
            password: required_env("STORE_PASSWORD")?,
        };

        let config = Config {
            chains,
            settlement,
            store,
            scan: ScanConfig {
                poll_interval_ms: parsed_env("POLL_INTERVAL_MS", default_poll_interval()),
                accepted_nonce_cache_size: cache_size_from_env(),
            },
            http: HttpConfig {
                timeout_ms: parsed_env("HTTP_TIMEOUT_MS", default_http_timeout()),
            },
            announce: AnnounceConfig {
                interval_ms: parsed_env("ANNOUNCE_INTERVAL_MS", default_announce_interval()),
                max_attempts: parsed_env("ANNOUNCE_MAX_ATTEMPTS", default_announce_max_attempts()),
            },
            api: ApiServerConfig {
                bind_address: env::var("API_BIND_ADDRESS")
                    .unwrap_or_else(|_| default_api_bind_address()),
                port: parsed_env("API_PORT", default_api_port()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|c| c.enabled)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.enabled_chains().next().is_none() {
            return Err(eyre!("At least one enabled chain must be configured"));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(eyre!(
                    "Chain {} is configured more than once; every chain needs exactly one scanner",
                    chain.chain_id
                ));
            }

            if chain.rpc_urls.is_empty() {
                return Err(eyre!("Chain {} has no RPC URLs", chain.chain_id));
            }
            for url in &chain.rpc_urls {
                validate_rpc_url(url, &format!("Chain {} RPC URL", chain.chain_id))?;
            }
            for url in &chain.disabled_rpc_urls {
                if !chain.rpc_urls.contains(url) {
                    return Err(eyre!(
                        "Chain {} disables {} which is not one of its RPC URLs",
                        chain.chain_id,
                        url
                    ));
                }
            }

            if let AuthType::Basic { username, password } = &chain.rpc_auth {
                if username.is_empty() || password.is_empty() {
                    return Err(eyre!(
                        "Chain {} uses basic RPC auth but user or password is empty",
                        chain.chain_id
                    ));
                }
            }
        }

        validate_rpc_url(&self.settlement.url, "SETTLEMENT_API_URL")?;
        validate_rpc_url(&self.store.url, "STORE_API_URL")?;

        if self.scan.poll_interval_ms == 0 {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than 0"));
        }
        if self.announce.interval_ms == 0 {
            return Err(eyre!("ANNOUNCE_INTERVAL_MS must be greater than 0"));
        }

        Ok(())
    }
}

/// Load the indexed `CHAIN_{i}_*` variables, `i` from 1 to `CHAINS_COUNT`
fn load_chains_from_env() -> Result<Vec<ChainConfig>> {
    let count: usize = required_env("CHAINS_COUNT")?
        .trim()
        .parse()
        .wrap_err("CHAINS_COUNT must be a valid number")?;

    let mut chains = Vec::with_capacity(count);

    for i in 1..=count {
        let prefix = format!("CHAIN_{}", i);

        let chain_id: ChainId = required_env(&format!("{}_ID", prefix))?
            .trim()
            .parse()
            .map_err(|_| eyre!("Invalid {}_ID", prefix))?;

        let name =
            env::var(format!("{}_NAME", prefix)).unwrap_or_else(|_| format!("chain_{}", chain_id));

        let rpc_urls = parse_rpc_urls(&required_env(&format!("{}_RPC_URLS", prefix))?);

        let disabled_rpc_urls = env::var(format!("{}_DISABLED_RPC_URLS", prefix))
            .map(|raw| parse_rpc_urls(&raw))
            .unwrap_or_default();

        let rpc_auth = match env::var(format!("{}_RPC_AUTH", prefix))
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" | "" => AuthType::None,
            "basic" => AuthType::Basic {
                username: env::var(format!("{}_RPC_USER", prefix)).unwrap_or_default(),
                password: env::var(format!("{}_RPC_PASSWORD", prefix)).unwrap_or_default(),
            },
            other => {
                return Err(eyre!(
                    "{}_RPC_AUTH must be none or basic, got {}",
                    prefix,
                    other
                ))
            }
        };

        let enabled: bool = env::var(format!("{}_ENABLED", prefix))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        chains.push(ChainConfig {
            chain_id,
            name,
            rpc_urls,
            disabled_rpc_urls,
            rpc_auth,
            enabled,
        });
    }

    Ok(chains)
}
