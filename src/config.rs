use std::time::Duration;

use crate::manager::DEFAULT_OPERATION_TIMEOUT;
use crate::secret::HasherConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Upper bound on pooled PostgreSQL connections.
    /// Set via KEYMINT_DB_MAX_CONNECTIONS. Default: 10.
    pub db_max_connections: u32,
    /// Argon2id cost for newly issued credentials.
    /// Set via KEYMINT_HASH_MEMORY_KIB / KEYMINT_HASH_ITERATIONS / KEYMINT_HASH_PARALLELISM.
    pub hasher: HasherConfig,
    /// Per-operation deadline. Set via KEYMINT_OPERATION_TIMEOUT_SECS. Default: 10.
    pub operation_timeout: Duration,
    pub log_format: LogFormat,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = HasherConfig::default();

    let log_format = match std::env::var("KEYMINT_LOG_FORMAT")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "json" => LogFormat::Json,
        "" | "text" => LogFormat::Text,
        other => {
            eprintln!("KEYMINT_LOG_FORMAT={other} is not recognised, using text output");
            LogFormat::Text
        }
    };

    Ok(Config {
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/keymint".into()),
        db_max_connections: env_parse("KEYMINT_DB_MAX_CONNECTIONS").unwrap_or(10),
        hasher: HasherConfig {
            memory_kib: env_parse("KEYMINT_HASH_MEMORY_KIB").unwrap_or(defaults.memory_kib),
            iterations: env_parse("KEYMINT_HASH_ITERATIONS").unwrap_or(defaults.iterations),
            parallelism: env_parse("KEYMINT_HASH_PARALLELISM").unwrap_or(defaults.parallelism),
        },
        operation_timeout: env_parse("KEYMINT_OPERATION_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT),
        log_format,
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
