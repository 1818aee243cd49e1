// src/config.rs

//! Manages server configuration: loading, resolving optional values, and validation.

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;

/// Selects the cache backend implementation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Process-local map.
    #[default]
    Internal,
    /// Shared remote K/V store.
    Memcache,
}

/// Upstream endpoints.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackendConfig {
    /// Origin application server, `host:port`.
    #[serde(default = "default_appserver")]
    pub appserver: String,
    /// K/V fragment upstream, `host:port`.
    #[serde(default = "default_memcache")]
    pub memcache: String,
    /// Deadline for a single origin fetch.
    #[serde(default = "default_origin_timeout")]
    pub origin_timeout_secs: u64,
    #[serde(default)]
    pub db: DbConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            appserver: default_appserver(),
            memcache: default_memcache(),
            origin_timeout_secs: default_origin_timeout(),
            db: DbConfig::default(),
        }
    }
}

fn default_appserver() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_memcache() -> String {
    "127.0.0.1:11211".to_string()
}
fn default_origin_timeout() -> u64 {
    10
}

/// Database backend settings, including pool bounds.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_db_pool")]
    pub pool_min: u32,
    #[serde(default = "default_db_pool")]
    pub pool_max: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            name: String::new(),
            user: String::new(),
            password: String::new(),
            pool_min: default_db_pool(),
            pool_max: default_db_pool(),
        }
    }
}

fn default_db_host() -> String {
    "127.0.0.1".to_string()
}
fn default_db_pool() -> u32 {
    1
}

/// Cache tier selection and, for the remote tier, its endpoint and pool size.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub kind: CacheKind,
    #[serde(default = "default_memcache")]
    pub server: String,
    #[serde(default = "default_cache_pool")]
    pub pool: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::default(),
            server: default_memcache(),
            pool: default_cache_pool(),
        }
    }
}

fn default_cache_pool() -> usize {
    1
}

/// Names of the internal control headers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeaderConfig {
    /// Presence of this request header triggers a purge.
    #[serde(default = "default_purge_header")]
    pub purge: String,
    /// Origin cache directive header (`max-age=N`).
    #[serde(default = "default_cache_header")]
    pub cache: String,
    /// Loop-prevention marker set on upstream requests.
    #[serde(default = "default_twice_header")]
    pub twice: String,
    /// Origin cookie-variance header.
    #[serde(default = "default_cookies_header")]
    pub cookies: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            purge: default_purge_header(),
            cache: default_cache_header(),
            twice: default_twice_header(),
            cookies: default_cookies_header(),
        }
    }
}

fn default_purge_header() -> String {
    "x-purge".to_string()
}
fn default_cache_header() -> String {
    "x-twice-control".to_string()
}
fn default_twice_header() -> String {
    "x-twice".to_string()
}
fn default_cookies_header() -> String {
    "x-twice-vary".to_string()
}

/// Page-key derivation settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HashConfig {
    /// Static host override; empty means "use the request's host".
    #[serde(default)]
    pub rewrite_host: String,
    /// Vary page keys on the request language.
    #[serde(default)]
    pub lang_header: bool,
    #[serde(default = "default_lang")]
    pub lang_default: String,
    /// Cookie carrying the session id.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            rewrite_host: String::new(),
            lang_header: false,
            lang_default: default_lang(),
            session_cookie: default_session_cookie(),
        }
    }
}

fn default_lang() -> String {
    "en-us".to_string()
}
fn default_session_cookie() -> String {
    "session_cookie".to_string()
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_interface")]
    interface: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    /// Soft RSS budget in megabytes for the watchdog.
    #[serde(default = "default_memory_limit")]
    memory_limit: u64,
    #[serde(default = "default_template_regex")]
    template_regex: String,
    #[serde(default)]
    backend: BackendConfig,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    headers: HeaderConfig,
    #[serde(default)]
    hash: HashConfig,
}

fn default_interface() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_memory_limit() -> u64 {
    100
}
fn default_template_regex() -> String {
    r"<%%\s+(.*?)\s+%%>".to_string()
}

/// Represents the final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub interface: String,
    pub port: u16,
    pub log_level: String,
    pub memory_limit: u64,
    pub template_regex: String,
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub headers: HeaderConfig,
    pub hash: HashConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            port: default_port(),
            log_level: default_log_level(),
            memory_limit: default_memory_limit(),
            template_regex: default_template_regex(),
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
            headers: HeaderConfig::default(),
            hash: HashConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            interface: raw.interface,
            port: raw.port,
            log_level: raw.log_level,
            memory_limit: raw.memory_limit,
            template_regex: raw.template_regex,
            backend: raw.backend,
            cache: raw.cache,
            headers: raw.headers,
            hash: raw.hash,
        };

        config.validate()?;
        Ok(config)
    }

    /// The static host override, if one is configured.
    pub fn rewrite_host(&self) -> Option<String> {
        let host = self.hash.rewrite_host.trim();
        (!host.is_empty()).then(|| host.to_string())
    }

    /// Compiles the marker pattern. Validation guarantees exactly one
    /// capture group (the payload).
    pub fn compiled_template(&self) -> Result<Regex> {
        let pattern = Regex::new(&self.template_regex)
            .with_context(|| format!("Invalid template_regex '{}'", self.template_regex))?;
        if pattern.captures_len() != 2 {
            return Err(anyhow!(
                "template_regex must have exactly one capture group (the marker payload)"
            ));
        }
        Ok(pattern)
    }

    /// Validates the configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.interface.trim().is_empty() {
            return Err(anyhow!("interface cannot be empty"));
        }
        if self.memory_limit == 0 {
            return Err(anyhow!("memory_limit cannot be 0"));
        }
        if self.backend.appserver.trim().is_empty() {
            return Err(anyhow!("backend.appserver cannot be empty"));
        }
        if self.backend.origin_timeout_secs == 0 {
            return Err(anyhow!("backend.origin_timeout_secs cannot be 0"));
        }
        if self.backend.db.pool_min > self.backend.db.pool_max {
            return Err(anyhow!("backend.db.pool_min cannot exceed pool_max"));
        }
        if self.cache.pool == 0 {
            return Err(anyhow!("cache.pool cannot be 0"));
        }
        if self.cache.kind == CacheKind::Memcache && self.cache.server.trim().is_empty() {
            return Err(anyhow!("cache.server cannot be empty for the memcache backend"));
        }
        for (name, value) in [
            ("headers.purge", &self.headers.purge),
            ("headers.cache", &self.headers.cache),
            ("headers.twice", &self.headers.twice),
            ("headers.cookies", &self.headers.cookies),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} cannot be empty"));
            }
        }
        self.compiled_template()?;
        Ok(())
    }
}
