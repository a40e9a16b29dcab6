use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::auth::TokenConfig;
use crate::store::models::BonusScope;

/// Knobs for the resolution and consolidation services.
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    /// Upper bound on one resolution transaction, lock wait included.
    pub resolution_timeout: Duration,
    /// Totals that receive the perfect-card bonus.
    pub perfect_card_scope: BonusScope,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            resolution_timeout: Duration::from_secs(30),
            perfect_card_scope: BonusScope::AllTime,
        }
    }
}

impl ScoringConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            resolution_timeout: Duration::from_secs(env_or(
                "RESOLUTION_TIMEOUT_SECS",
                defaults.resolution_timeout.as_secs(),
            )),
            perfect_card_scope: env_or("PERFECT_CARD_SCOPE", defaults.perfect_card_scope),
        }
    }
}

/// Process-wide settings read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub scoring: ScoringConfig,
    pub token: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            scoring: ScoringConfig::from_env(),
            token: TokenConfig::new(),
        }
    }
}

/// Parses `key` if set. Malformed values fall back to `default` with a warning.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring malformed configuration value");
            default
        }),
        Err(_) => default,
    }
}
