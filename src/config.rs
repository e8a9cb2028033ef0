use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// How the manager rebuilds its snapshot after a confirmed write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Re-fetch every task of the board.
    #[default]
    Refetch,
    /// Merge the records confirmed by the API into the current snapshot.
    Merge,
}

impl std::fmt::Display for RefreshStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshStrategy::Refetch => write!(f, "refetch"),
            RefreshStrategy::Merge => write!(f, "merge"),
        }
    }
}

impl std::str::FromStr for RefreshStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "refetch" => Ok(RefreshStrategy::Refetch),
            "merge" => Ok(RefreshStrategy::Merge),
            _ => Err(format!("Invalid refresh strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub refresh: RefreshStrategy,
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refresh: RefreshStrategy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_url = lookup("KANBAN_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        let timeout = match lookup("KANBAN_API_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                AppError::Config(format!("KANBAN_API_TIMEOUT_SECS is not a number: {}", raw))
            })?),
            None => defaults.timeout,
        };

        let refresh = match lookup("KANBAN_REFRESH_STRATEGY") {
            Some(raw) => raw.parse().map_err(AppError::Config)?,
            None => defaults.refresh,
        };

        let event_capacity = match lookup("KANBAN_EVENT_CAPACITY") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(AppError::Config(format!(
                        "KANBAN_EVENT_CAPACITY must be a positive number: {}",
                        raw
                    )))
                }
            },
            None => defaults.event_capacity,
        };

        Ok(Self {
            api_url,
            timeout,
            refresh,
            event_capacity,
        })
    }
}
