// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Built once at startup and passed explicitly to the clients and the
//! sync engine. A `.env` file in the working directory is honored.

use chrono::FixedOffset;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default OpenWeather city (Beijing region).
pub const DEFAULT_CITY_ID: &str = "1798082";

/// Sport types queried in per-type fan-out mode unless overridden.
pub const DEFAULT_SPORT_TYPES: &[&str] = &[
    "running",
    "walking",
    "cycling",
    "swimming",
    "ropeSkipping",
    "training",
];

pub const DEFAULT_KEEP_API_BASE: &str = "https://api.gotokeep.com";
pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com";
pub const DEFAULT_OPENWEATHER_API_BASE: &str = "http://api.openweathermap.org";

/// How activities are pulled from Keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// One aggregate `type=all` query (the primary fetch).
    #[default]
    All,
    /// One query per configured sport type.
    PerType,
}

impl FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FetchMode::All),
            "per-type" | "per_type" | "pertype" => Ok(FetchMode::PerType),
            other => Err(format!("unknown fetch mode: {}", other)),
        }
    }
}

/// Which command the configuration is loaded for.
///
/// The weather page never talks to Keep, so it does not need the Keep
/// credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigScope {
    #[default]
    Sync,
    WeatherPage,
}

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    // --- Secrets ---
    /// Notion integration token
    pub notion_token: String,
    /// Target Notion database
    pub notion_database_id: String,
    /// Keep account phone number
    pub keep_mobile: String,
    /// Keep account password
    pub keep_password: String,
    /// OpenWeather API key
    pub openweather_api_key: String,

    // --- Tunables ---
    /// OpenWeather city ID used for every weather lookup
    pub city_id: String,
    /// Sport types for fan-out fetches
    pub sport_types: Vec<String>,
    pub fetch_mode: FetchMode,
    /// Upper bound on pages fetched per query
    pub max_pages: u32,
    /// Records processed concurrently
    pub workers: usize,
    /// List the destination once per run instead of querying per record
    pub prefetch_index: bool,
    /// Local offset used to turn timestamps into calendar days
    pub utc_offset_minutes: i32,
    pub http_timeout: Duration,
    pub track_probe_timeout: Duration,

    // --- Endpoints ---
    pub keep_api_base: String,
    pub notion_api_base: String,
    pub openweather_api_base: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("notion_database_id", &self.notion_database_id)
            .field("city_id", &self.city_id)
            .field("sport_types", &self.sport_types)
            .field("fetch_mode", &self.fetch_mode)
            .field("max_pages", &self.max_pages)
            .field("workers", &self.workers)
            .field("prefetch_index", &self.prefetch_index)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            notion_token: "test_notion_token".to_string(),
            notion_database_id: "test_database".to_string(),
            keep_mobile: "13800000000".to_string(),
            keep_password: "test_password".to_string(),
            openweather_api_key: "test_weather_key".to_string(),
            city_id: DEFAULT_CITY_ID.to_string(),
            sport_types: DEFAULT_SPORT_TYPES.iter().map(|s| s.to_string()).collect(),
            fetch_mode: FetchMode::All,
            max_pages: 50,
            workers: 4,
            prefetch_index: false,
            utc_offset_minutes: 480,
            http_timeout: Duration::from_secs(15),
            track_probe_timeout: Duration::from_secs(5),
            keep_api_base: DEFAULT_KEEP_API_BASE.to_string(),
            notion_api_base: DEFAULT_NOTION_API_BASE.to_string(),
            openweather_api_base: DEFAULT_OPENWEATHER_API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration for `scope` from environment variables.
    pub fn from_env_for(scope: ConfigScope) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_vars_for(|name| env::var(name).ok(), scope)
    }

    /// Build sync configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_vars_for(lookup, ConfigScope::Sync)
    }

    /// Build configuration for `scope` from an arbitrary variable lookup.
    ///
    /// Empty values are treated as missing. Required credentials are all
    /// checked before returning, so the run never starts half-configured.
    /// Keep credentials are only required for `ConfigScope::Sync`.
    pub fn from_vars_for<F>(lookup: F, scope: ConfigScope) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let notion_token = require("NOTION_TOKEN")?;
        let notion_database_id = require("NOTION_DATABASE_ID")?;
        let (keep_mobile, keep_password) = match scope {
            ConfigScope::Sync => (require("KEEP_MOBILE")?, require("KEEP_PASSWORD")?),
            ConfigScope::WeatherPage => (
                get("KEEP_MOBILE").unwrap_or_default(),
                get("KEEP_PASSWORD").unwrap_or_default(),
            ),
        };
        let openweather_api_key = require("OPENWEATHER_API_KEY")?;

        let sport_types: Vec<String> = get("KEEP_SPORT_TYPES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .filter(|types: &Vec<String>| !types.is_empty())
            .unwrap_or_else(|| DEFAULT_SPORT_TYPES.iter().map(|s| s.to_string()).collect());

        let fetch_mode = match get("KEEP_FETCH_MODE") {
            Some(v) => v.parse().map_err(ConfigError::Invalid)?,
            None => FetchMode::All,
        };

        let parse_or = |name: &str, default: u64| {
            get(name)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let utc_offset_minutes = get("SYNC_UTC_OFFSET_MINUTES")
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|m| m.abs() < 24 * 60)
            .unwrap_or(480);

        Ok(Self {
            notion_token,
            notion_database_id,
            keep_mobile,
            keep_password,
            openweather_api_key,
            city_id: get("CITY_ID").unwrap_or_else(|| DEFAULT_CITY_ID.to_string()),
            sport_types,
            fetch_mode,
            max_pages: parse_or("KEEP_MAX_PAGES", 50).max(1) as u32,
            workers: parse_or("SYNC_WORKERS", 4).max(1) as usize,
            prefetch_index: get("SYNC_PREFETCH_INDEX")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True" | "yes"))
                .unwrap_or(false),
            utc_offset_minutes,
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 15).max(1)),
            track_probe_timeout: Duration::from_secs(
                parse_or("TRACK_PROBE_TIMEOUT_SECS", 5).max(1),
            ),
            keep_api_base: get("KEEP_API_BASE")
                .unwrap_or_else(|| DEFAULT_KEEP_API_BASE.to_string()),
            notion_api_base: get("NOTION_API_BASE")
                .unwrap_or_else(|| DEFAULT_NOTION_API_BASE.to_string()),
            openweather_api_base: get("OPENWEATHER_API_BASE")
                .unwrap_or_else(|| DEFAULT_OPENWEATHER_API_BASE.to_string()),
        })
    }

    /// The configured local offset.
    pub fn utc_offset(&self) -> FixedOffset {
        crate::time_utils::offset_from_minutes(self.utc_offset_minutes)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}
