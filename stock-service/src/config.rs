use anyhow::{anyhow, bail, Context};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8087;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:5173",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String, max_connections: u32, run_migrations: bool },
    /// Process-local store seeded from `STOCK_MEMORY_SEED` (`id:qty,id:qty`).
    Memory { seed: Vec<(i64, i64)> },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub addr: SocketAddr,
    pub backend: StoreBackend,
    pub lock_timeout: Duration,
    pub max_attempts: u32,
    pub allowed_origins: Vec<String>,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let ip: IpAddr = host.parse().with_context(|| format!("HOST is not an IP address: {host}"))?;
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;

        let backend = match lookup("STOCK_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StoreBackend::Postgres {
                database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
                run_migrations: flag(&lookup, "RUN_MIGRATIONS", true),
            },
            "memory" => StoreBackend::Memory {
                seed: parse_seed(lookup("STOCK_MEMORY_SEED").as_deref().unwrap_or(""))?,
            },
            other => bail!("STOCK_BACKEND must be `postgres` or `memory`, got `{other}`"),
        };

        let lock_timeout = Duration::from_millis(parse_or(&lookup, "STOCK_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)?);
        let max_attempts: u32 = parse_or(&lookup, "STOCK_MAX_ATTEMPTS", crate::controller::DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            bail!("STOCK_MAX_ATTEMPTS must be at least 1");
        }

        let allowed_origins = match lookup("CORS_ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            addr: SocketAddr::from((ip, port)),
            backend,
            lock_timeout,
            max_attempts,
            allowed_origins,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw}")),
        None => Ok(default),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_seed(raw: &str) -> anyhow::Result<Vec<(i64, i64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| -> anyhow::Result<(i64, i64)> {
            let (id, qty) = pair
                .split_once(':')
                .ok_or_else(|| anyhow!("STOCK_MEMORY_SEED entry `{pair}` is not id:qty"))?;
            let id: i64 = id.trim().parse().with_context(|| format!("bad product id in `{pair}`"))?;
            let qty: i64 = qty.trim().parse().with_context(|| format!("bad quantity in `{pair}`"))?;
            if id <= 0 || qty < 0 {
                bail!("STOCK_MEMORY_SEED entry `{pair}` out of range");
            }
            Ok((id, qty))
        })
        .collect()
}
