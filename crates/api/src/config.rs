//! Application configuration loaded from environment variables.

use std::time::Duration;

use messaging::FailurePolicy;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable is set to a value that cannot be used.
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Which catalog store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8083`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `STORE`: `postgres` or `memory` (default: `postgres`)
/// - `DATABASE_DSN`: PostgreSQL URL, required for the postgres store
/// - `DB_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `RABBIT_DSN`: AMQP URL (default: `"amqp://localhost:5672"`)
/// - `DISABLE_RABBITMQ`: skip the broker entirely (default: `false`)
/// - `EVENTS_EXCHANGE`: topic exchange name (default: `"events"`)
/// - `DEAD_LETTER_EXCHANGE`: exchange for rejected messages (default: unset)
/// - `FAILURE_POLICY`: `drop`, `retry` or `requeue` (default: `drop`)
/// - `RETRY_MAX`: retries for the `retry` policy (default: `3`)
/// - `UNIT_OF_WORK_TIMEOUT_SECS`: stock reservation bound (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub store: StoreBackend,
    pub database_dsn: Option<String>,
    pub db_max_connections: u32,
    pub rabbit_dsn: String,
    pub disable_rabbitmq: bool,
    pub events_exchange: String,
    pub dead_letter_exchange: Option<String>,
    pub failure_policy: FailurePolicy,
    pub unit_of_work_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store = match var("STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => return Err(invalid("STORE", other)),
        };
        let database_dsn = var("DATABASE_DSN");
        if store == StoreBackend::Postgres && database_dsn.is_none() {
            return Err(ConfigError::Missing("DATABASE_DSN"));
        }

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other)),
        };

        let retry_max = parse_or(var("RETRY_MAX"), "RETRY_MAX", 3usize)?;
        let failure_policy = match var("FAILURE_POLICY").as_deref() {
            None | Some("drop") => FailurePolicy::DropAndLog,
            Some("retry") => FailurePolicy::retry(retry_max),
            Some("requeue") => FailurePolicy::RequeueOnce,
            Some(other) => return Err(invalid("FAILURE_POLICY", other)),
        };

        let disable_rabbitmq = match var("DISABLE_RABBITMQ").as_deref() {
            None => defaults.disable_rabbitmq,
            Some(v) => parse_bool(v).ok_or_else(|| invalid("DISABLE_RABBITMQ", v))?,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(var("PORT"), "PORT", defaults.port)?,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            store,
            database_dsn,
            db_max_connections: parse_or(
                var("DB_MAX_CONNECTIONS"),
                "DB_MAX_CONNECTIONS",
                defaults.db_max_connections,
            )?,
            rabbit_dsn: var("RABBIT_DSN").unwrap_or(defaults.rabbit_dsn),
            disable_rabbitmq,
            events_exchange: var("EVENTS_EXCHANGE").unwrap_or(defaults.events_exchange),
            dead_letter_exchange: var("DEAD_LETTER_EXCHANGE"),
            failure_policy,
            unit_of_work_timeout: Duration::from_secs(parse_or(
                var("UNIT_OF_WORK_TIMEOUT_SECS"),
                "UNIT_OF_WORK_TIMEOUT_SECS",
                defaults.unit_of_work_timeout.as_secs(),
            )?),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            store: StoreBackend::Postgres,
            database_dsn: None,
            db_max_connections: 5,
            rabbit_dsn: "amqp://localhost:5672".to_string(),
            disable_rabbitmq: false,
            events_exchange: messaging::amqp::DEFAULT_EXCHANGE.to_string(),
            dead_letter_exchange: None,
            failure_policy: FailurePolicy::DropAndLog,
            unit_of_work_timeout: replica::registry::DEFAULT_UNIT_OF_WORK_TIMEOUT,
        }
    }
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| invalid(name, &v)),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
