use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// 3000 days, the record and cookie lifetime used when nothing else is set
pub const DEFAULT_SESSION_EXPIRE_SECONDS: i64 = 86_400 * 3_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Consecutive command failures before the circuit opens
    #[serde(default = "default_cb_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    /// Half-open successes before the circuit closes
    #[serde(default = "default_cb_success_threshold")]
    pub circuit_breaker_success_threshold: u32,
    /// Seconds the circuit stays open before probing
    #[serde(default = "default_cb_reset_timeout")]
    pub circuit_breaker_reset_timeout_seconds: u64,
    /// First retry delay of the startup dial loop
    #[serde(default = "default_backoff_initial_delay")]
    pub backoff_initial_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay")]
    pub backoff_max_delay_ms: u64,
    /// Dial attempts before startup gives up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Record backend: "redis" or "memory"
    #[serde(default = "default_session_backend")]
    pub backend: String,
    /// Cookie signing secrets, newest first. Tokens are always signed with
    /// the first one; the rest are only accepted when decoding.
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Maximum serialized record size in bytes, 0 disables the check
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Cookie max-age and token lifetime in seconds
    #[serde(default = "default_max_age")]
    pub max_age: i64,
    /// Record TTL for sessions whose max-age is 0
    #[serde(default = "default_default_max_age")]
    pub default_max_age: i64,
    /// "json" or "msgpack"
    #[serde(default = "default_serializer")]
    pub serializer: String,
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
    #[serde(default)]
    pub cookie_domain: Option<String>,
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default = "default_true")]
    pub cookie_http_only: bool,
    /// "lax", "strict" or "none"
    #[serde(default = "default_same_site")]
    pub cookie_same_site: String,
    /// TTL for bare key/value records written through `store`
    #[serde(default = "default_data_ttl")]
    pub data_ttl_seconds: i64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    2
}

fn default_cb_reset_timeout() -> u64 {
    30
}

fn default_backoff_initial_delay() -> u64 {
    100
}

fn default_backoff_max_delay() -> u64 {
    5_000
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_session_backend() -> String {
    "redis".to_string()
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_key_prefix() -> String {
    "session_".to_string()
}

fn default_max_length() -> usize {
    4096
}

fn default_max_age() -> i64 {
    DEFAULT_SESSION_EXPIRE_SECONDS
}

fn default_default_max_age() -> i64 {
    60 * 20 // 20 minutes
}

fn default_serializer() -> String {
    "json".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_same_site() -> String {
    "lax".to_string()
}

fn default_data_ttl() -> i64 {
    DEFAULT_SESSION_EXPIRE_SECONDS
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("redis.url", default_redis_url())?
            .set_default("session.backend", default_session_backend())?
            .set_default("session.key_prefix", default_key_prefix())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, REDIS__URL, SESSION__KEY_PREFIX, SESSION__SECRETS=new,old
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("session.secrets")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            circuit_breaker_failure_threshold: default_cb_failure_threshold(),
            circuit_breaker_success_threshold: default_cb_success_threshold(),
            circuit_breaker_reset_timeout_seconds: default_cb_reset_timeout(),
            backoff_initial_delay_ms: default_backoff_initial_delay(),
            backoff_max_delay_ms: default_backoff_max_delay(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            secrets: vec![],
            cookie_name: default_cookie_name(),
            key_prefix: default_key_prefix(),
            max_length: default_max_length(),
            max_age: default_max_age(),
            default_max_age: default_default_max_age(),
            serializer: default_serializer(),
            cookie_path: default_cookie_path(),
            cookie_domain: None,
            cookie_secure: false,
            cookie_http_only: true,
            cookie_same_site: default_same_site(),
            data_ttl_seconds: default_data_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8080);

        let session = SessionConfig::default();
        assert_eq!(session.key_prefix, "session_");
        assert_eq!(session.max_length, 4096);
        assert_eq!(session.max_age, 259_200_000);
        assert_eq!(session.default_max_age, 1200);
        assert_eq!(session.serializer, "json");
        assert!(session.cookie_http_only);
    }

    #[test]
    fn test_session_section_from_partial_source() {
        let settings: Settings = Config::builder()
            .set_override("session.key_prefix", "app_")
            .unwrap()
            .set_override("session.secrets", vec!["new", "old"])
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.session.key_prefix, "app_");
        assert_eq!(settings.session.secrets, vec!["new", "old"]);
        assert_eq!(settings.session.max_length, 4096);
        assert_eq!(settings.redis.url, "redis://localhost:6379");
    }
}
