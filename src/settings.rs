use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::planner::{RouteSpec, TripMode};

const ENV_PREFIX: &str = "FLIGHTS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Line dumps of windows that failed segmentation are written here.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

fn default_country() -> String {
    "US".into()
}

fn default_currency() -> String {
    "USD".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/flights.sqlite")
}

fn default_timeout_secs() -> u64 {
    15
}

/// Positional route shapes, as written in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RouteEntry {
    /// `[origin, dest, leave, return, flex]`
    RoundTrip(String, String, NaiveDate, NaiveDate, i64),
    /// `[origin, dest, anchor, flex]`
    OneWay(String, String, NaiveDate, i64),
    /// `[origin, dest, days_from_today]`
    Forward(String, String, i64),
}

impl TryFrom<RouteEntry> for RouteSpec {
    type Error = ScrapeError;

    fn try_from(entry: RouteEntry) -> Result<Self, Self::Error> {
        let (origin, destination, mode) = match entry {
            RouteEntry::RoundTrip(o, d, leave, ret, flex) => (o, d, TripMode::FlexibleRoundTrip { leave, ret, flex }),
            RouteEntry::OneWay(o, d, anchor, flex) => (o, d, TripMode::FlexibleOneWay { anchor, flex }),
            RouteEntry::Forward(o, d, days) => {
                let range_len = u32::try_from(days).map_err(|_| {
                    ScrapeError::Configuration(format!("{o} -> {d}: day range must be >= 0, got {days}"))
                })?;
                (o, d, TripMode::SimpleForward { range_len })
            }
        };
        Ok(RouteSpec {
            origin: origin.trim().to_uppercase(),
            destination: destination.trim().to_uppercase(),
            mode,
        })
    }
}

impl Settings {
    /// Layered load: optional file at `path` (any format `config` knows),
    /// then `FLIGHTS_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        settings
            .try_deserialize()
            .with_context(|| format!("Invalid settings in {:?}", path))
    }

    pub fn route_specs(&self) -> Result<Vec<RouteSpec>, ScrapeError> {
        self.routes.iter().cloned().map(RouteSpec::try_from).collect()
    }
}

// ── Tests ──
