//! Process configuration read once from the environment at start-up.

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use mono_db::{ConnectionProfile, DatabaseRole, DatabaseSettings, PoolSettings};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:8080"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub databases: DatabaseSettings,
    pub secret_key: String,
    pub cors_origins: Vec<String>,
    pub bootstrap_schema: bool,
    pub log_api_requests: bool,
    pub pagination_max_limit: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("MONO_API_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("invalid MONO_API_ADDR")?;

        let pool = PoolSettings {
            pool_size: parse_or(&lookup, "DB_POOL_SIZE", 10)?,
            max_overflow: parse_or(&lookup, "DB_MAX_OVERFLOW", 20)?,
            pool_timeout: Duration::from_secs(parse_or(&lookup, "DB_POOL_TIMEOUT", 30)?),
            pool_recycle: Duration::from_secs(parse_or(&lookup, "DB_POOL_RECYCLE", 3600)?),
        };

        let databases = DatabaseSettings {
            main: profile_from(&lookup, DatabaseRole::Main, "MYSQL", "mono_api_main", pool)?,
            analytics: profile_from(
                &lookup,
                DatabaseRole::Analytics,
                "MYSQL_ANALYTICS",
                "mono_api_analytics",
                pool,
            )?,
            logs: profile_from(&lookup, DatabaseRole::Logs, "MYSQL_LOGS", "mono_api_logs", pool)?,
        };

        let secret_key = lookup("SECRET_KEY").unwrap_or_default();
        if secret_key.trim().is_empty() {
            bail!("SECRET_KEY must be set to a non-empty value");
        }

        let cors_origins = match lookup("BACKEND_CORS_ORIGINS") {
            Some(raw) => parse_origin_list(&raw).context("invalid BACKEND_CORS_ORIGINS")?,
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        let pagination_max_limit: i64 = parse_or(&lookup, "PAGINATION_MAX_LIMIT", 100)?;
        if pagination_max_limit < 1 {
            bail!("PAGINATION_MAX_LIMIT must be at least 1");
        }

        Ok(Self {
            listen_addr,
            databases,
            secret_key,
            cors_origins,
            bootstrap_schema: bool_var(&lookup, "MONO_BOOTSTRAP_SCHEMA")?.unwrap_or(true),
            log_api_requests: bool_var(&lookup, "MONO_LOG_API_REQUESTS")?.unwrap_or(false),
            pagination_max_limit,
        })
    }
}

fn profile_from<F>(
    lookup: &F,
    role: DatabaseRole,
    prefix: &str,
    default_database: &str,
    pool: PoolSettings,
) -> Result<ConnectionProfile>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| format!("{prefix}_{suffix}");

    if let Some(dsn) = lookup(&var("DSN")).filter(|dsn| !dsn.trim().is_empty()) {
        return Ok(ConnectionProfile::from_dsn(role, dsn).with_pool(pool));
    }

    let profile = ConnectionProfile::mysql(
        role,
        lookup(&var("HOST")).unwrap_or_else(|| "localhost".to_string()),
        parse_or(lookup, &var("PORT"), 3306)?,
        lookup(&var("USER")).unwrap_or_else(|| "root".to_string()),
        lookup(&var("PASSWORD")).unwrap_or_default(),
        lookup(&var("DATABASE")).unwrap_or_else(|| default_database.to_string()),
    );
    Ok(profile.with_pool(pool))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: '{raw}'")),
        None => Ok(default),
    }
}

fn bool_var<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => bail!("invalid {key}: '{raw}' is not a boolean"),
    }
}

/// Accepts either a comma separated list or a JSON array of strings.
fn parse_origin_list(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    let origins: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("expected a JSON array of strings")?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };

    Ok(origins
        .into_iter()
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect())
}
