// src/config.rs
// Environment-driven configuration. `.env` is loaded by the binary before
// this runs, so plain env vars are the single source of truth.

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::{NotifierError, Result};

const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
const ENV_BIND_ADDR: &str = "BIND_ADDR";
const ENV_SCHEDULE_TIMES: &str = "SCHEDULE_TIMES";
const ENV_SCHEDULE_TZ: &str = "SCHEDULE_TZ";
const ENV_EXPO_ACCESS_TOKEN: &str = "EXPO_ACCESS_TOKEN";

/// Process-wide configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the SQLite database file (created on first open).
    pub database_path: String,
    pub bind_addr: String,
    /// Local wall-clock times at which the pipeline fires, one job each.
    pub schedule_times: Vec<NaiveTime>,
    pub schedule_tz: Tz,
    /// Optional Expo access token (raises push rate limits).
    pub expo_access_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_path =
            std::env::var(ENV_DATABASE_PATH).unwrap_or_else(|_| "data/notifier.db".to_string());
        let bind_addr =
            std::env::var(ENV_BIND_ADDR).unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let schedule_times = match std::env::var(ENV_SCHEDULE_TIMES) {
            Ok(raw) => parse_schedule_times(&raw)?,
            // Default to 5 PM and 10 PM local time.
            Err(_) => parse_schedule_times("17:00,22:00")?,
        };

        let schedule_tz = match std::env::var(ENV_SCHEDULE_TZ) {
            Ok(raw) => raw
                .parse::<Tz>()
                .map_err(|_| NotifierError::Config(format!("unknown timezone: {raw}")))?,
            Err(_) => chrono_tz::Asia::Seoul,
        };

        let expo_access_token = std::env::var(ENV_EXPO_ACCESS_TOKEN)
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            database_path,
            bind_addr,
            schedule_times,
            schedule_tz,
            expo_access_token,
        })
    }
}

/// Parse a comma-separated list of `HH:MM` times.
pub fn parse_schedule_times(raw: &str) -> Result<Vec<NaiveTime>> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let t = NaiveTime::parse_from_str(part, "%H:%M")
            .map_err(|_| NotifierError::Config(format!("invalid schedule time: {part}")))?;
        out.push(t);
    }
    if out.is_empty() {
        return Err(NotifierError::Config(
            "SCHEDULE_TIMES must contain at least one HH:MM entry".to_string(),
        ));
    }
    Ok(out)
}
