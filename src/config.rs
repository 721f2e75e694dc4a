use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_MAX_RETRY, DEFAULT_MAX_SESSIONS, DEFAULT_MAX_SSE_CONNECTIONS,
    DEFAULT_SESSION_TTL_SECS, DEFAULT_SWEEP_CRON, EMULATED_SESSION_TTL_SECS,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub trust_proxy: bool,
    pub rate_limit: RateLimitConfig,
    pub worker: WorkerConfig,
    pub session: SessionConfig,
    pub limits: LimitsConfig,
}

/// Per-client request budgets per window. Session creation draws only from `max_allocations`.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
    pub max_allocations: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub sweep_cron: String,
}

/// Allocation and expiry parameters shared by the allocator and the sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub max_sessions: usize,
    pub max_retry: u32,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_sse_connections: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 900,
            max_requests: 500,
            max_allocations: 20,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            is_leader: true,
            sweep_cron: DEFAULT_SWEEP_CRON.to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_retry: DEFAULT_MAX_RETRY,
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sse_connections: DEFAULT_MAX_SSE_CONNECTIONS,
        }
    }
}

impl SessionConfig {
    /// Short-lived sessions for running against a local or emulated setup.
    pub fn emulated() -> Self {
        Self {
            ttl_secs: EMULATED_SESSION_TTL_SECS,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    pub fn from_env() -> Self {
        let emulated = env_or_bool("SESSION_EMULATED", false);
        let session_defaults = if emulated {
            SessionConfig::emulated()
        } else {
            SessionConfig::default()
        };
        // 模拟环境下每分钟清理一次
        let default_cron = if emulated {
            "0 * * * * *"
        } else {
            DEFAULT_SWEEP_CRON
        };

        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/dice-sessions.sled"),
            cors_origin: env_or("CORS_ORIGIN", "*"),
            trust_proxy: env_or_bool("TRUST_PROXY", false),
            rate_limit: RateLimitConfig {
                window_secs: env_or_parse("RATE_LIMIT_WINDOW_SECS", 900_u64),
                max_requests: env_or_parse("RATE_LIMIT_MAX", 500_u64),
                max_allocations: env_or_parse("RATE_LIMIT_CREATE_MAX", 20_u64),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                sweep_cron: env_or("SESSION_SWEEP_CRON", default_cron),
            },
            session: SessionConfig {
                max_sessions: env_or_parse("MAX_SESSIONS", session_defaults.max_sessions),
                max_retry: env_or_parse("SESSION_MAX_RETRY", session_defaults.max_retry).max(1),
                ttl_secs: env_or_parse("SESSION_TTL_SECS", session_defaults.ttl_secs),
            },
            limits: LimitsConfig {
                max_sse_connections: env_or_parse(
                    "MAX_SSE_CONNECTIONS",
                    DEFAULT_MAX_SSE_CONNECTIONS,
                ),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
