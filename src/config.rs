use std::{str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where meals are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("unknown DIARY_STORE `{}` (expected postgres or memory)", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub slot_cache_ttl_secs: u64,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let store = match get("DIARY_STORE") {
            Some(v) => v.parse()?,
            None => StoreBackend::Postgres,
        };
        let database_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when DIARY_STORE=postgres");
        }

        let jwt = JwtConfig {
            secret: get("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "food-diary".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "food-diary-patients".into()),
            ttl_minutes: parse_or(&get, "JWT_TTL_MINUTES", 60)?,
        };

        Ok(Self {
            store,
            database_url,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout_secs: parse_or(&get, "DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            slot_cache_ttl_secs: parse_or(&get, "SLOT_CACHE_TTL_SECS", 24 * 60 * 60)?,
            jwt,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "APP_PORT", 8080)?,
        })
    }

    pub fn slot_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.slot_cache_ttl_secs)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value `{}`: {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/diary"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Postgres);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.slot_cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(cfg.jwt.issuer, "food-diary");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn memory_store_needs_no_database() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("DIARY_STORE", "memory"),
            ("JWT_SECRET", "s3cret"),
            ("SLOT_CACHE_TTL_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.slot_cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn missing_or_bad_values_are_errors() {
        assert!(AppConfig::from_lookup(lookup(&[("JWT_SECRET", "x")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("DIARY_STORE", "memory")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[
            ("DIARY_STORE", "memory"),
            ("JWT_SECRET", "x"),
            ("APP_PORT", "eighty"),
        ]))
        .is_err());
        assert!("redis".parse::<StoreBackend>().is_err());
    }
}
