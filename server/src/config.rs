// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite://database/hr.db";
const DEFAULT_PORT: &str = "3000";
const DEFAULT_ROLLOVER_CHECK_SECS: &str = "3600";
const DEFAULT_MAX_ROLLOVER_DAYS: &str = "5";

/// Runtime settings, read once at startup and handed to the application state.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// How often the background job looks for a year change.
    pub rollover_check_interval: Duration,
    /// Cap on vacation days carried into the next year.
    pub max_rollover_days: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: 3000,
            rollover_check_interval: Duration::from_secs(3600),
            max_rollover_days: 5.0,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// missing keys.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_rollover_days: f64 =
            try_load(&lookup, "HR_MAX_ROLLOVER_DAYS", DEFAULT_MAX_ROLLOVER_DAYS)?;
        if !max_rollover_days.is_finite() || max_rollover_days < 0.0 {
            return Err(anyhow!(
                "HR_MAX_ROLLOVER_DAYS must be a non-negative number, got {max_rollover_days}"
            ));
        }

        Ok(Self {
            database_url: try_load(&lookup, "HR_DATABASE_URL", DEFAULT_DATABASE_URL)?,
            port: try_load(&lookup, "HR_PORT", DEFAULT_PORT)?,
            rollover_check_interval: Duration::from_secs(try_load(
                &lookup,
                "HR_ROLLOVER_CHECK_SECS",
                DEFAULT_ROLLOVER_CHECK_SECS,
            )?),
            max_rollover_days,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}
