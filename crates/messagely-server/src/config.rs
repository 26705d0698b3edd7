use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use messagely_db::WorkFactor;

/// Placeholder JWT secret that must be replaced outside development.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub work_factor: WorkFactor,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = get("MESSAGELY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&get, "MESSAGELY_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let defaults = WorkFactor::default();

        Ok(Self {
            addr,
            db_path: get("MESSAGELY_DB_PATH")
                .unwrap_or_else(|| "messagely.db".into())
                .into(),
            jwt_secret: get("MESSAGELY_JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.into()),
            token_ttl: token_ttl(parse_or(&get, "MESSAGELY_TOKEN_TTL_DAYS", 30)?)?,
            work_factor: WorkFactor {
                memory_kib: parse_or(&get, "MESSAGELY_HASH_MEMORY_KIB", defaults.memory_kib)?,
                iterations: parse_or(&get, "MESSAGELY_HASH_ITERATIONS", defaults.iterations)?,
                parallelism: parse_or(&get, "MESSAGELY_HASH_PARALLELISM", defaults.parallelism)?,
            },
        })
    }
}

fn token_ttl(days: i64) -> anyhow::Result<chrono::Duration> {
    if days <= 0 {
        anyhow::bail!("MESSAGELY_TOKEN_TTL_DAYS must be positive, got {}", days);
    }
    chrono::Duration::try_days(days)
        .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
        .with_context(|| format!("MESSAGELY_TOKEN_TTL_DAYS out of range: {}", days))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.parse().with_context(|| format!("{} is not valid: {:?}", key, raw)),
        None => Ok(default),
    }
}
