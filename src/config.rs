use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite(PathBuf),
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub store: StoreBackend,
    /// `None` disables archival.
    pub archive_url: Option<String>,
    pub archive_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let store = match env::var("STORE_BACKEND").as_deref() {
            Ok("sqlite") | Err(_) => StoreBackend::Sqlite(PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "trip_dispatch.db".to_string()),
            )),
            Ok("memory") => StoreBackend::Memory,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid STORE_BACKEND: {other}, expected sqlite or memory"
                )));
            }
        };

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok("json") => LogFormat::Json,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact or json"
                )));
            }
        };

        let archive_url = env::var("ARCHIVE_URL")
            .unwrap_or_else(|_| "http://localhost:21802".to_string());
        let archive_url = Some(archive_url.trim().to_string()).filter(|url| !url.is_empty());

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 21803)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            store,
            archive_url,
            archive_timeout: Duration::from_millis(parse_or_default("ARCHIVE_TIMEOUT_MS", 2000)?),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
