use crate::http::HttpConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub debounce_ms: u64,
    pub per_page: u32,
    /// How far ahead of the viewport edge the sentinel fires, in logical px.
    pub near_edge_margin: f32,
    /// Row height used to place the sentinel marker in fixed-row lists.
    pub row_extent: f32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            per_page: 12,
            near_edge_margin: 150.0,
            row_extent: 48.0,
        }
    }
}

impl FeedConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub http: Option<HttpConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = parse_override(&lookup, "FEEDWALKER_DEBOUNCE_MS") {
            self.feed.debounce_ms = ms;
        }
        if let Some(per_page) = parse_override::<u32>(&lookup, "FEEDWALKER_PER_PAGE") {
            if per_page == 0 {
                warn!("FEEDWALKER_PER_PAGE must be positive, keeping {}", self.feed.per_page);
            } else {
                self.feed.per_page = per_page;
            }
        }
        if let Some(token) = lookup("FEEDWALKER_TOKEN") {
            match self.http.as_mut() {
                Some(http) => http.bearer_token = Some(token),
                None => info!("FEEDWALKER_TOKEN set without an HTTP source, ignoring"),
            }
        }
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T::Err: Display,
{
    let raw = lookup(key)?;
    raw.trim()
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value {raw:?}: {e}");
        })
        .ok()
}
