//! Runtime configuration for the importer.
//!
//! Values come from the environment (a `.env` file is loaded first by the
//! binary). Only `DB_URL` is required.

use chrono::NaiveDate;
use encoding_rs::Encoding;

use crate::clock::first_day_of_month;
use crate::error::ConfigError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ENCODING: &str = "shift_jis";

#[derive(Debug, Clone)]
pub struct ImporterConfig {
    pub db_url: String,
    pub max_connections: u32,
    /// Encoding of the municipal exports.
    pub encoding: &'static Encoding,
    /// Pins the month statistics are recorded against instead of the current one.
    pub target_month: Option<NaiveDate>,
}

impl ImporterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_url = lookup("DB_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DB_URL"))?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|err| ConfigError::Invalid {
                    key: "DB_MAX_CONNECTIONS",
                    value: raw.clone(),
                    reason: err.to_string(),
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let label = lookup("CSV_ENCODING").unwrap_or_else(|| DEFAULT_ENCODING.to_string());
        let encoding =
            Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| ConfigError::Invalid {
                key: "CSV_ENCODING",
                value: label.clone(),
                reason: "not a known encoding label".to_string(),
            })?;

        let target_month = match lookup("TARGET_MONTH") {
            Some(raw) if !raw.trim().is_empty() => Some(parse_target_month(&raw)?),
            _ => None,
        };

        Ok(Self {
            db_url,
            max_connections,
            encoding,
            target_month,
        })
    }
}

/// Accepts `YYYY-MM-DD` or `YYYY-MM` and normalizes to the first of the month.
pub fn parse_target_month(raw: &str) -> Result<NaiveDate, ConfigError> {
    let trimmed = raw.trim();
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d"))
        .map_err(|err| ConfigError::Invalid {
            key: "TARGET_MONTH",
            value: raw.to_string(),
            reason: err.to_string(),
        })?;
    Ok(first_day_of_month(date))
}
