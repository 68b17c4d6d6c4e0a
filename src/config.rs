use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use serde_json::Value;
use thiserror::Error;

use crate::application::commission::LedgerOptions;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub commission_interval: Duration,
    pub ledger: LedgerOptions,
    /// One JSON document per commission ratio item.
    pub commission_ratios: Vec<String>,
    /// One JSON document per marketing group item.
    pub marketing_groups: Vec<String>,
    pub user_marketing_groups: HashMap<i64, String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Settings::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::Missing("DATABASE_URL"))?;

        let interval_secs: u64 = parsed(&lookup, "COMMISSION_INTERVAL_SECS", 300)?;
        if interval_secs == 0 {
            return Err(invalid("COMMISSION_INTERVAL_SECS", "must be positive"));
        }
        let page_size: i64 = parsed(&lookup, "COMMISSION_PAGE_SIZE", 100)?;
        if page_size < 1 {
            return Err(invalid("COMMISSION_PAGE_SIZE", "must be positive"));
        }
        let max_pages: usize = parsed(&lookup, "COMMISSION_MAX_PAGES", 1000)?;
        let offset_hours: i32 = parsed(&lookup, "COMMISSION_UTC_OFFSET_HOURS", 8)?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or_else(|| invalid("COMMISSION_UTC_OFFSET_HOURS", "out of range"))?;

        let commission_ratios = json_items(&lookup, "COMMISSION_RATIOS")?;
        let marketing_groups = json_items(&lookup, "MARKETING_GROUPS")?;
        let user_marketing_groups = user_groups(&lookup)?;

        Ok(Self {
            database_url,
            commission_interval: Duration::from_secs(interval_secs),
            ledger: LedgerOptions {
                page_size,
                max_pages,
                utc_offset,
            },
            commission_ratios,
            marketing_groups,
            user_marketing_groups,
        })
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        name,
        reason: reason.into(),
    }
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(name, e.to_string())),
        None => Ok(default),
    }
}

/// A JSON array whose elements are either objects or strings holding a JSON
/// object; each element becomes one raw item.
fn json_items<F>(lookup: &F, name: &'static str) -> Result<Vec<String>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(Vec::new());
    };
    let items: Vec<Value> =
        serde_json::from_str(&raw).map_err(|e| invalid(name, e.to_string()))?;
    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

fn user_groups<F>(lookup: &F) -> Result<HashMap<i64, String>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    const NAME: &str = "USER_MARKETING_GROUPS";
    let Some(raw) = lookup(NAME) else {
        return Ok(HashMap::new());
    };
    let by_key: HashMap<String, String> =
        serde_json::from_str(&raw).map_err(|e| invalid(NAME, e.to_string()))?;
    by_key
        .into_iter()
        .map(|(user, group)| {
            let user = user
                .parse::<i64>()
                .map_err(|_| invalid(NAME, format!("user id {user:?}")))?;
            Ok((user, group))
        })
        .collect()
}
